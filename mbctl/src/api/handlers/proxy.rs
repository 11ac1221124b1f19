use crate::{
    AppState,
    api::models::proxy::{InvokeRequest, ProxyRequest},
    auth::CurrentUser,
    compile,
    dispatch::{self, TokenCharge},
    errors::{Error, Result},
    tokens,
};
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header::CONTENT_TYPE},
    response::Response,
};
use bytes::Bytes;
use futures::StreamExt;
use serde_json::{Value, json};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, warn};

/// Forward a caller-built provider request
#[utoipa::path(
    post,
    path = "/proxy",
    tag = "proxy",
    summary = "Proxy a provider request",
    description = "Injects the provider credential when the caller has not supplied one, forwards \
                   the request and returns the provider's JSON body and status code verbatim. \
                   Non-2xx provider responses are wrapped as {\"error\": body}.",
    request_body = ProxyRequest,
    responses(
        (status = 200, description = "Provider response body"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_jwt" = []))
)]
pub async fn proxy(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<ProxyRequest>,
) -> Result<Response> {
    let ProxyRequest { url, options } = request;
    let mut headers = options.headers;
    let body = options.body;

    // Add auth to headers and price the input while we're at it
    let charge = state
        .dispatcher
        .authorize_and_count(&state.registry, &url, &mut headers, &body);
    debug!(user = %user.user_id, %url, ?charge, "proxying provider request");

    let (status, response_body) = state.dispatcher.send(&url, &headers, &body).await?;

    // Return the response from the external server back to the client
    let payload = if status.is_success() {
        response_body.unwrap_or(Value::Null)
    } else {
        json!({ "error": response_body })
    };

    Ok(Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .map_err(|err| Error::Internal {
            operation: format!("build proxy response: {err}"),
        })?)
}

/// Compile and stream a model invocation
#[utoipa::path(
    post,
    path = "/models/{model_name}/invoke",
    tag = "proxy",
    summary = "Invoke a configured model",
    description = "Compiles the model's request template with the supplied parameters and inputs, \
                   enforces the monthly usage ceilings, streams the extracted result text back to \
                   the caller and records usage for the user and global scopes afterwards.",
    params(("model_name" = String, Path, description = "Model display name")),
    request_body = InvokeRequest,
    responses(
        (status = 200, description = "Extracted result fragments, streamed"),
        (status = 400, description = "Unknown model or unsupported payload"),
        (status = 401, description = "Unauthorized"),
        (status = 429, description = "Monthly usage ceiling reached"),
    ),
    security(("bearer_jwt" = []))
)]
pub async fn invoke_model(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(model_name): Path<String>,
    Json(request): Json<InvokeRequest>,
) -> Result<Response> {
    state
        .usage
        .check_and_throttle(&user.user_id, &model_name)
        .await?;

    let descriptor = compile::compile(
        &state.registry,
        &model_name,
        &request.parameters,
        request.inputs.as_ref(),
    )?;

    let mut headers = descriptor.headers;
    let charge = state.dispatcher.authorize_and_count(
        &state.registry,
        &descriptor.url,
        &mut headers,
        &descriptor.payload,
    );
    let input_tokens = match charge {
        TokenCharge::Counted(count) => count,
        TokenCharge::AlreadyAuthorized => 1,
        TokenCharge::Unsupported => {
            return Err(Error::BadRequest {
                message: format!("No provider credential available for model {model_name}"),
            });
        }
    };
    if let Some(cost) = tokens::cost_estimate(&state.registry, &model_name, input_tokens, 0) {
        debug!(%cost, input_tokens, "estimated input cost for invocation");
    }

    let upstream = state
        .dispatcher
        .send_streaming(&descriptor.url, &headers, &descriptor.payload)
        .await?;

    // Forward extracted fragments as they arrive; record usage once the
    // upstream stream is drained. Usage already recorded is never reverted.
    let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(16);
    let ledger = state.usage.clone();
    let result_path = descriptor.result_path;
    let user_id = user.user_id;

    tokio::spawn(async move {
        let mut output_tokens: u64 = 0;
        let mut chunks = upstream.bytes_stream();

        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    warn!(%err, "upstream stream ended with an error");
                    break;
                }
            };
            match serde_json::from_slice::<Value>(&chunk) {
                Ok(value) => match dispatch::extract(&value, &result_path) {
                    Some(result) => {
                        let fragment = dispatch::fragment_text(result);
                        // output cost is approximated by forwarded length
                        output_tokens += fragment.len() as u64;
                        if tx.send(Bytes::from(fragment)).await.is_err() {
                            break;
                        }
                    }
                    None => warn!("result path not present in upstream chunk"),
                },
                Err(err) => warn!(%err, "skipping unparseable upstream chunk"),
            }
        }

        if let Err(err) = ledger
            .record_usage(&user_id, &model_name, input_tokens, output_tokens)
            .await
        {
            error!("Failed to record usage after streamed call: {err:#}");
        }
    });

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, std::convert::Infallible>));
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "application/json")
        .body(body)
        .map_err(|err| Error::Internal {
            operation: format!("build streaming response: {err}"),
        })
}
