use crate::{
    AppState,
    api::models::projects::{
        OptimizeRequest, OptimizeResponse, ProjectWithMetadata, ShareRequest, ShareResponse,
    },
    auth::CurrentUser,
    compile,
    db::handlers::ShareOutcome,
    db::models::projects::{Example, Project, ProjectUpdate},
    dispatch::{Provider, TokenCharge},
    errors::{Error, Result},
    types::{ProjectId, abbrev_uuid},
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::debug;
use uuid::Uuid;

/// Create a new project
#[utoipa::path(
    post,
    path = "/projects",
    tag = "projects",
    summary = "Create a project",
    description = "Creates an empty project owned by the caller, seeded with one glue-code entry \
                   per configured model",
    responses(
        (status = 201, description = "Project created", body = Project),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_jwt" = []))
)]
pub async fn create_project(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<(StatusCode, Json<Project>)> {
    let project = Project::new(&user.user_id, &state.registry);
    state.projects.create(&project).await?;
    debug!(
        project = %abbrev_uuid(&project.project_id),
        user = %user.user_id,
        "created project"
    );
    Ok((StatusCode::CREATED, Json(project)))
}

/// List the caller's own projects
#[utoipa::path(
    get,
    path = "/projects/owner",
    tag = "projects",
    summary = "List projects owned by the caller",
    responses(
        (status = 200, description = "Projects created by the caller", body = [Project]),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_jwt" = []))
)]
pub async fn list_owner_projects(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<Project>>> {
    let projects = state.projects.list_by_owner(&user.user_id).await?;
    Ok(Json(projects))
}

/// List projects shared with the caller
#[utoipa::path(
    get,
    path = "/projects/shared",
    tag = "projects",
    summary = "List projects shared with the caller",
    responses(
        (status = 200, description = "Projects shared with the caller's email", body = [Project]),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_jwt" = []))
)]
pub async fn list_shared_projects(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<Project>>> {
    let projects = state.projects.list_shared_with(&user.email).await?;
    Ok(Json(projects))
}

/// Get a project by id
#[utoipa::path(
    get,
    path = "/projects/{project_id}",
    tag = "projects",
    summary = "Get a project",
    description = "Returns the project document with the model registry metadata attached",
    params(("project_id" = Uuid, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project with registry metadata", body = ProjectWithMetadata),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Project not found"),
    ),
    security(("bearer_jwt" = []))
)]
pub async fn get_project(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(project_id): Path<ProjectId>,
) -> Result<Json<ProjectWithMetadata>> {
    let project = state
        .projects
        .get(project_id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Project".to_string(),
            id: project_id.to_string(),
        })?;

    Ok(Json(ProjectWithMetadata {
        project,
        metadata: state.registry.metadata(),
    }))
}

/// Save a project
#[utoipa::path(
    put,
    path = "/projects/{project_id}",
    tag = "projects",
    summary = "Save a project",
    description = "Full-document replace of the project's name, examples, input schema and glue \
                   code. Last write wins; there is no version check.",
    params(("project_id" = Uuid, Path, description = "Project ID")),
    request_body = ProjectUpdate,
    responses(
        (status = 200, description = "Saved project", body = Project),
        (status = 400, description = "Input codes do not match the configured models"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Project not found"),
    ),
    security(("bearer_jwt" = []))
)]
pub async fn update_project(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(project_id): Path<ProjectId>,
    Json(update): Json<ProjectUpdate>,
) -> Result<Json<Project>> {
    // inputCodes carries exactly one entry per configured model
    let supplied: BTreeSet<&str> = update.input_codes.iter().map(|c| c.name.as_str()).collect();
    let configured: BTreeSet<&str> = state.registry.names().collect();
    if supplied != configured || supplied.len() != update.input_codes.len() {
        return Err(Error::BadRequest {
            message: "inputCodes must contain exactly one entry per configured model".to_string(),
        });
    }

    let project = state
        .projects
        .update(project_id, update, Utc::now())
        .await?;
    Ok(Json(project))
}

/// Delete a project
#[utoipa::path(
    delete,
    path = "/projects/{project_id}",
    tag = "projects",
    summary = "Delete a project",
    params(("project_id" = Uuid, Path, description = "Project ID")),
    responses(
        (status = 204, description = "Project deleted"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_jwt" = []))
)]
pub async fn delete_project(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(project_id): Path<ProjectId>,
) -> Result<StatusCode> {
    state.projects.delete(project_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Share a project
#[utoipa::path(
    post,
    path = "/projects/{project_id}/share",
    tag = "projects",
    summary = "Share a project",
    description = "Grants read access to the given email address. Sharing with an address that \
                   already has access reports so without changing anything.",
    params(("project_id" = Uuid, Path, description = "Project ID")),
    request_body = ShareRequest,
    responses(
        (status = 200, description = "Share outcome", body = ShareResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Project not found"),
    ),
    security(("bearer_jwt" = []))
)]
pub async fn share_project(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(project_id): Path<ProjectId>,
    Json(request): Json<ShareRequest>,
) -> Result<Json<ShareResponse>> {
    let outcome = state.projects.share(project_id, &request.user_email).await?;
    let message = match outcome {
        ShareOutcome::Shared => "Project shared".to_string(),
        ShareOutcome::AlreadyShared => "Email already shared with this project".to_string(),
    };
    Ok(Json(ShareResponse { message }))
}

/// Generate optimized glue code for a project
#[utoipa::path(
    post,
    path = "/projects/{project_id}/optimize-prompt",
    tag = "projects",
    summary = "Generate optimized glue code",
    description = "Builds a code-generation prompt from the project's examples and input schema \
                   and asks Claude 3.5 Sonnet for glue code targeting the selected model \
                   configuration",
    params(("project_id" = Uuid, Path, description = "Project ID")),
    request_body = OptimizeRequest,
    responses(
        (status = 200, description = "Generated glue code", body = OptimizeResponse),
        (status = 400, description = "Unknown model configuration"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Project not found"),
    ),
    security(("bearer_jwt" = []))
)]
pub async fn optimize_prompt(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(project_id): Path<ProjectId>,
    Json(request): Json<OptimizeRequest>,
) -> Result<Json<OptimizeResponse>> {
    let project = state
        .projects
        .get(project_id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Project".to_string(),
            id: project_id.to_string(),
        })?;

    // Resolve the selected configuration's endpoint and provider model id
    let descriptor = compile::compile(
        &state.registry,
        &request.selected_config,
        &serde_json::Map::new(),
        None,
    )?;
    let model = descriptor.payload["model"].as_str().unwrap_or("gpt-3.5-turbo");

    let prompt = build_codegen_prompt(&project, &request.selected_config, &descriptor.url, model);

    // Ask Claude 3.5 Sonnet for the code, through the regular dispatch path
    let url = "https://api.anthropic.com/v1/messages";
    let mut headers = std::collections::BTreeMap::from([
        ("Content-Type".to_string(), "application/json".to_string()),
        ("anthropic-version".to_string(), "2023-06-01".to_string()),
    ]);
    let body = serde_json::json!({
        "model": "claude-3-5-sonnet-20240620",
        "max_tokens": 4000,
        "messages": [{ "role": "user", "content": prompt }]
    });

    let charge = state
        .dispatcher
        .authorize_and_count(&state.registry, url, &mut headers, &body);
    if charge == TokenCharge::Unsupported {
        return Err(Error::Internal {
            operation: "authorize code generation request".to_string(),
        });
    }

    let (status, response) = state.dispatcher.send(url, &headers, &body).await?;
    if !status.is_success() {
        return Err(Error::Upstream {
            status: status.as_u16(),
            body: response,
        });
    }

    let generated = response
        .as_ref()
        .and_then(|body| body["content"][0]["text"].as_str())
        .ok_or_else(|| Error::Internal {
            operation: "parse code generation response".to_string(),
        })?;

    Ok(Json(OptimizeResponse {
        input_code: extract_code_block(generated),
    }))
}

/// Build the code-generation prompt from the project's examples and schema.
fn build_codegen_prompt(project: &Project, selected_config: &str, api_url: &str, model: &str) -> String {
    let api_type = match Provider::from_url(api_url) {
        Some(Provider::Anthropic) => "Anthropic",
        Some(Provider::Groq) => "Groq",
        _ => "OpenAI-compatible",
    };

    let input_fields = project
        .input_schema
        .iter()
        .map(|field| field.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let mut examples_block = String::new();
    let mut index = 0;
    for example in &project.examples {
        let result = example.results.get(selected_config);
        let has_signal = result.map(|r| r.parsed_output.is_some()).unwrap_or(false)
            || example.expected_output.is_some()
            || example.output_description.is_some();
        if !has_signal {
            continue;
        }
        index += 1;
        examples_block.push_str(&format_example(index, example, selected_config));
    }

    format!(
        r#"You are an expert JavaScript developer. Generate input code for an API testing system based on the provided examples and configuration.

REQUIREMENTS:
1. Generate a complete JavaScript code that includes three functions: chat, parser, and fn
2. The chat function should make a call to the API endpoint
3. The parser function should parse the response from the chat function
4. The fn function should always be the main function with input fields as arguments and should have the system message, chat and parser function calls
5. The resultant code should be executable and handle the specific API format

CONFIGURATION:
- API URL: {api_url}
- Model: {model}
- API Type: {api_type}
- Input Parameters: {input_fields}

EXAMPLES DATA:
{examples_block}
Generate the complete JavaScript code following this structure:

async function chat(messages, model = "{model}", json_mode = false) {{
	// Implementation for {api_type} API
}}

function parser(content) {{
	// Implementation to parse the API response
}}

async function fn({input_fields}) {{
	// Main function implementation with system message based on examples
	// Should use the chat function and parser function
	// Should have retry logic and error handling
}}

Make sure the generated code:
- Handles the specific API format correctly
- Includes appropriate system messages based on the examples
- Has proper error handling and retry logic
- Returns {{result, response}} on success or {{response, error}} on failure
- Uses the correct API endpoints and headers
- Uses fetch instead of axios
- Don't include the API key and Authorization header in the code"#,
    )
}

fn format_example(index: usize, example: &Example, selected_config: &str) -> String {
    let result = example.results.get(selected_config);
    let field = |value: Option<String>| value.unwrap_or_else(|| "Not specified".to_string());
    let actual = result
        .and_then(|r| r.parsed_output.as_ref())
        .map(Value::to_string)
        .unwrap_or_else(|| "Not available".to_string());
    let comments = if example.comments.is_empty() {
        "None".to_string()
    } else {
        example.comments.join("; ")
    };
    let status = result
        .map(|r| format!("{:?}", r.status).to_lowercase())
        .unwrap_or_else(|| "unknown".to_string());

    format!(
        "\nExample {index}:\n- Input: {input}\n- Expected Output: {expected}\n- Output Description: {description}\n- Actual Output: {actual}\n- Comments: {comments}\n- Status: {status}\n",
        input = Value::Object(example.input.clone()),
        expected = field(example.expected_output.clone()),
        description = field(example.output_description.clone()),
    )
}

/// Pull the first fenced code block out of a model reply, or the whole reply
/// when it isn't fenced.
fn extract_code_block(text: &str) -> String {
    let Some(open) = text.find("```") else {
        return text.trim().to_string();
    };
    let after_fence = &text[open + 3..];
    // skip the language tag on the fence line
    let code_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let code = &after_fence[code_start..];
    match code.find("```") {
        Some(close) => code[..close].trim().to_string(),
        None => code.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::projects::{InputField, ModelResult, ReviewStatus};
    use crate::registry::ModelRegistry;
    use serde_json::json;

    #[test]
    fn code_blocks_are_extracted_from_fenced_replies() {
        let reply = "Here you go:\n```javascript\nasync function fn() {}\n```\nEnjoy!";
        assert_eq!(extract_code_block(reply), "async function fn() {}");

        let bare_fence = "```\nlet x = 1;\n```";
        assert_eq!(extract_code_block(bare_fence), "let x = 1;");

        let unfenced = "  async function fn() {}  ";
        assert_eq!(extract_code_block(unfenced), "async function fn() {}");

        let unterminated = "```js\nlet x = 1;";
        assert_eq!(extract_code_block(unterminated), "let x = 1;");
    }

    #[test]
    fn codegen_prompt_names_the_configuration_and_examples() {
        let registry = ModelRegistry::builtin();
        let mut project = Project::new("user-1", &registry);
        project.input_schema = vec![
            InputField {
                name: "interest".to_string(),
                extra: serde_json::Map::new(),
            },
            InputField {
                name: "role".to_string(),
                extra: serde_json::Map::new(),
            },
        ];
        let mut example = Example {
            input: json!({"interest": "climbing"}).as_object().unwrap().clone(),
            expected_output: Some("a scenario".to_string()),
            ..Default::default()
        };
        example.results.insert(
            "GPT4".to_string(),
            ModelResult {
                output: Some("raw".to_string()),
                parsed_output: Some(json!({"Name": "x"})),
                error: None,
                status: ReviewStatus::Approved,
            },
        );
        project.examples.push(example);
        // an example with no signal is left out
        project.examples.push(Example::default());

        let prompt = build_codegen_prompt(
            &project,
            "GPT4",
            "https://api.openai.com/v1/chat/completions",
            "gpt-4",
        );

        assert!(prompt.contains("API URL: https://api.openai.com/v1/chat/completions"));
        assert!(prompt.contains("Model: gpt-4"));
        assert!(prompt.contains("API Type: OpenAI-compatible"));
        assert!(prompt.contains("Input Parameters: interest, role"));
        assert!(prompt.contains("Example 1:"));
        assert!(!prompt.contains("Example 2:"));
        assert!(prompt.contains("- Status: approved"));
        assert!(prompt.contains("async function fn(interest, role)"));
    }
}
