//! DynamoDB store implementations.
//!
//! The projects table is keyed by `projectId` with a `createdByUserIdIndex`
//! GSI for owner listings; shared-project listings scan with a `contains`
//! filter on the share list. The usage table uses the composite
//! `PK`/`SK` layout with ADD-expression increments, so concurrent writers
//! accumulate rather than overwrite.

use super::{ProjectStore, ShareOutcome, UsageStore};
use crate::config::StorageConfig;
use crate::db::errors::{Result, StorageError};
use crate::db::models::projects::{Project, ProjectUpdate};
use crate::db::models::usage::{UsageDelta, UsageRecord};
use crate::types::ProjectId;
use anyhow::Context;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, GlobalSecondaryIndex, KeySchemaElement,
    KeyType, Projection, ProjectionType, ScalarAttributeType,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tracing::info;

const CREATED_BY_INDEX: &str = "createdByUserIdIndex";

/// Build a DynamoDB client from the storage configuration.
///
/// An endpoint override (DynamoDB Local) switches to static throwaway
/// credentials so no real AWS identity is needed during development.
pub async fn dynamo_client(region: Option<&str>, endpoint_url: Option<&str>) -> Client {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(aws_config::Region::new(region.to_string()));
    }
    if let Some(endpoint) = endpoint_url {
        loader = loader.endpoint_url(endpoint).credentials_provider(
            aws_credential_types::Credentials::new("local", "local", None, None, "dynamodb-local"),
        );
    }
    Client::new(&loader.load().await)
}

// ---------------------------------------------------------------------------
// JSON <-> AttributeValue conversion
// ---------------------------------------------------------------------------

fn to_attr(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(to_attr).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), to_attr(v)))
                .collect(),
        ),
    }
}

fn from_attr(attr: &AttributeValue) -> Value {
    match attr {
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::N(n) => n
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| n.parse::<f64>().map(Value::from))
            .unwrap_or(Value::Null),
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::L(items) => Value::Array(items.iter().map(from_attr).collect()),
        AttributeValue::M(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), from_attr(v)))
                .collect(),
        ),
        _ => Value::Null,
    }
}

fn project_to_item(project: &Project) -> Result<HashMap<String, AttributeValue>> {
    let value = serde_json::to_value(project).context("serialize project")?;
    let Value::Object(map) = value else {
        return Err(StorageError::Other(anyhow::anyhow!(
            "project did not serialize to an object"
        )));
    };
    Ok(map.iter().map(|(k, v)| (k.clone(), to_attr(v))).collect())
}

fn item_to_project(item: &HashMap<String, AttributeValue>) -> Result<Project> {
    let map: serde_json::Map<String, Value> = item
        .iter()
        .map(|(k, v)| (k.clone(), from_attr(v)))
        .collect();
    serde_json::from_value(Value::Object(map))
        .context("deserialize project item")
        .map_err(StorageError::Other)
}

fn read_counter(item: &HashMap<String, AttributeValue>, name: &str) -> u64 {
    item.get(name)
        .and_then(|attr| attr.as_n().ok())
        .and_then(|n| n.parse::<u64>().ok())
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DynamoProjects {
    client: Client,
    table: String,
}

impl DynamoProjects {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait::async_trait]
impl ProjectStore for DynamoProjects {
    async fn create(&self, project: &Project) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(project_to_item(project)?))
            .send()
            .await
            .map_err(StorageError::other)?;
        Ok(())
    }

    async fn get(&self, id: ProjectId) -> Result<Option<Project>> {
        let out = self
            .client
            .get_item()
            .table_name(&self.table)
            .key("projectId", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(StorageError::other)?;

        out.item().map(item_to_project).transpose()
    }

    async fn update(
        &self,
        id: ProjectId,
        update: ProjectUpdate,
        updated_at: DateTime<Utc>,
    ) -> Result<Project> {
        let result = self
            .client
            .update_item()
            .table_name(&self.table)
            .key("projectId", AttributeValue::S(id.to_string()))
            .update_expression(
                "SET #name = :name, examples = :examples, inputSchema = :inputSchema, \
                 inputCodes = :inputCodes, updatedAt = :updatedAt",
            )
            .condition_expression("attribute_exists(projectId)")
            .expression_attribute_names("#name", "name")
            .expression_attribute_values(":name", AttributeValue::S(update.name.clone()))
            .expression_attribute_values(
                ":examples",
                to_attr(&serde_json::to_value(&update.examples).context("serialize examples")?),
            )
            .expression_attribute_values(
                ":inputSchema",
                to_attr(
                    &serde_json::to_value(&update.input_schema)
                        .context("serialize input schema")?,
                ),
            )
            .expression_attribute_values(
                ":inputCodes",
                to_attr(
                    &serde_json::to_value(&update.input_codes).context("serialize input codes")?,
                ),
            )
            .expression_attribute_values(
                ":updatedAt",
                to_attr(&serde_json::to_value(updated_at).context("serialize timestamp")?),
            )
            .return_values(aws_sdk_dynamodb::types::ReturnValue::AllNew)
            .send()
            .await;

        match result {
            Ok(out) => {
                let attributes = out
                    .attributes()
                    .ok_or_else(|| StorageError::Other(anyhow::anyhow!("update returned no attributes")))?;
                item_to_project(attributes)
            }
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception())
                {
                    return Err(StorageError::NotFound);
                }
                Err(StorageError::other(err))
            }
        }
    }

    async fn delete(&self, id: ProjectId) -> Result<()> {
        self.client
            .delete_item()
            .table_name(&self.table)
            .key("projectId", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(StorageError::other)?;
        Ok(())
    }

    async fn list_by_owner(&self, user_id: &str) -> Result<Vec<Project>> {
        let out = self
            .client
            .query()
            .table_name(&self.table)
            .index_name(CREATED_BY_INDEX)
            .key_condition_expression("createdByUserId = :userId")
            .expression_attribute_values(":userId", AttributeValue::S(user_id.to_string()))
            .send()
            .await
            .map_err(StorageError::other)?;

        out.items().iter().map(item_to_project).collect()
    }

    async fn list_shared_with(&self, email: &str) -> Result<Vec<Project>> {
        let out = self
            .client
            .scan()
            .table_name(&self.table)
            .filter_expression("contains(sharedWithUserEmails, :email)")
            .expression_attribute_values(":email", AttributeValue::S(email.to_string()))
            .send()
            .await
            .map_err(StorageError::other)?;

        out.items().iter().map(item_to_project).collect()
    }

    async fn share(&self, id: ProjectId, email: &str) -> Result<ShareOutcome> {
        let project = self.get(id).await?.ok_or(StorageError::NotFound)?;
        if project.shared_with_user_emails.iter().any(|e| e == email) {
            return Ok(ShareOutcome::AlreadyShared);
        }

        self.client
            .update_item()
            .table_name(&self.table)
            .key("projectId", AttributeValue::S(id.to_string()))
            .update_expression(
                "SET sharedWithUserEmails = \
                 list_append(if_not_exists(sharedWithUserEmails, :empty_list), :new_email)",
            )
            .expression_attribute_values(":empty_list", AttributeValue::L(vec![]))
            .expression_attribute_values(
                ":new_email",
                AttributeValue::L(vec![AttributeValue::S(email.to_string())]),
            )
            .send()
            .await
            .map_err(StorageError::other)?;

        Ok(ShareOutcome::Shared)
    }
}

// ---------------------------------------------------------------------------
// Usage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DynamoUsage {
    client: Client,
    table: String,
}

impl DynamoUsage {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait::async_trait]
impl UsageStore for DynamoUsage {
    async fn fetch(&self, pk: &str, sk: &str) -> Result<Option<UsageRecord>> {
        let out = self
            .client
            .query()
            .table_name(&self.table)
            .key_condition_expression("PK = :pk AND SK = :sk")
            .expression_attribute_values(":pk", AttributeValue::S(pk.to_string()))
            .expression_attribute_values(":sk", AttributeValue::S(sk.to_string()))
            .send()
            .await
            .map_err(StorageError::other)?;

        let Some(item) = out.items().first() else {
            return Ok(None);
        };
        Ok(Some(UsageRecord {
            invocation_count: read_counter(item, "invocationCount"),
            input_tokens: read_counter(item, "inputTokens"),
            output_tokens: read_counter(item, "outputTokens"),
            total_tokens: read_counter(item, "totalTokens"),
        }))
    }

    async fn add(&self, pk: &str, sk: &str, delta: UsageDelta) -> Result<()> {
        self.client
            .update_item()
            .table_name(&self.table)
            .key("PK", AttributeValue::S(pk.to_string()))
            .key("SK", AttributeValue::S(sk.to_string()))
            .update_expression(
                "ADD invocationCount :inc, inputTokens :in, outputTokens :out, totalTokens :tot",
            )
            .expression_attribute_values(":inc", AttributeValue::N(delta.invocations.to_string()))
            .expression_attribute_values(":in", AttributeValue::N(delta.input_tokens.to_string()))
            .expression_attribute_values(":out", AttributeValue::N(delta.output_tokens.to_string()))
            .expression_attribute_values(":tot", AttributeValue::N(delta.total_tokens().to_string()))
            .send()
            .await
            .map_err(StorageError::other)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Table bootstrap
// ---------------------------------------------------------------------------

/// Create the projects and usage tables if they don't already exist.
///
/// Used by the `--init-tables` maintenance mode against DynamoDB Local or a
/// fresh AWS account.
pub async fn init_tables(storage: &StorageConfig) -> anyhow::Result<()> {
    let StorageConfig::Dynamo {
        region,
        endpoint_url,
        projects_table,
        usage_table,
    } = storage
    else {
        anyhow::bail!("--init-tables requires dynamo storage configuration");
    };

    let client = dynamo_client(region.as_deref(), endpoint_url.as_deref()).await;

    create_projects_table(&client, projects_table).await?;
    create_usage_table(&client, usage_table).await?;
    Ok(())
}

async fn create_projects_table(client: &Client, table: &str) -> anyhow::Result<()> {
    let result = client
        .create_table()
        .table_name(table)
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name("projectId")
                .attribute_type(ScalarAttributeType::S)
                .build()?,
        )
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name("createdByUserId")
                .attribute_type(ScalarAttributeType::S)
                .build()?,
        )
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name("projectId")
                .key_type(KeyType::Hash)
                .build()?,
        )
        .billing_mode(BillingMode::PayPerRequest)
        .global_secondary_indexes(
            GlobalSecondaryIndex::builder()
                .index_name(CREATED_BY_INDEX)
                .key_schema(
                    KeySchemaElement::builder()
                        .attribute_name("createdByUserId")
                        .key_type(KeyType::Hash)
                        .build()?,
                )
                .projection(
                    Projection::builder()
                        .projection_type(ProjectionType::All)
                        .build(),
                )
                .build()?,
        )
        .send()
        .await;

    match result {
        Ok(_) => {
            info!(table, "Projects table created");
            Ok(())
        }
        Err(err) if err.as_service_error().is_some_and(|e| e.is_resource_in_use_exception()) => {
            info!(table, "Projects table already exists");
            Ok(())
        }
        Err(err) => Err(err).context("create projects table"),
    }
}

async fn create_usage_table(client: &Client, table: &str) -> anyhow::Result<()> {
    let result = client
        .create_table()
        .table_name(table)
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name("PK")
                .attribute_type(ScalarAttributeType::S)
                .build()?,
        )
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name("SK")
                .attribute_type(ScalarAttributeType::S)
                .build()?,
        )
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name("PK")
                .key_type(KeyType::Hash)
                .build()?,
        )
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name("SK")
                .key_type(KeyType::Range)
                .build()?,
        )
        .billing_mode(BillingMode::PayPerRequest)
        .send()
        .await;

    match result {
        Ok(_) => {
            info!(table, "Usage table created");
            Ok(())
        }
        Err(err) if err.as_service_error().is_some_and(|e| e.is_resource_in_use_exception()) => {
            info!(table, "Usage table already exists");
            Ok(())
        }
        Err(err) => Err(err).context("create usage table"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ModelRegistry;
    use serde_json::json;

    #[test]
    fn json_values_round_trip_through_attributes() {
        let value = json!({
            "string": "hello",
            "int": 42,
            "float": 0.5,
            "bool": true,
            "null": null,
            "list": [1, "two", {"three": 3}],
            "nested": {"deep": {"deeper": "value"}}
        });

        let attr = to_attr(&value);
        assert_eq!(from_attr(&attr), value);
    }

    #[test]
    fn projects_round_trip_through_items() {
        let registry = ModelRegistry::builtin();
        let project = Project::new("user-1", &registry);

        let item = project_to_item(&project).unwrap();
        assert!(matches!(item.get("projectId"), Some(AttributeValue::S(_))));

        let back = item_to_project(&item).unwrap();
        assert_eq!(back.project_id, project.project_id);
        assert_eq!(back.input_codes, project.input_codes);
        assert_eq!(back.created_at, project.created_at);
    }

    #[test]
    fn counters_default_to_zero_when_missing() {
        let item = HashMap::from([(
            "invocationCount".to_string(),
            AttributeValue::N("7".to_string()),
        )]);
        assert_eq!(read_counter(&item, "invocationCount"), 7);
        assert_eq!(read_counter(&item, "inputTokens"), 0);
    }
}
