//! Function triggers and input/output bindings.
//!
//! Each kind is a variant of a closed enum. Every variant can check its own
//! settings with `validate()` and render its `function.json` binding entry
//! with `to_binding_descriptor()`.

use anyhow::{Result, bail, ensure};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

const HTTP_METHODS: &[&str] = &["get", "post", "put", "patch", "delete", "head", "options", "trace"];

/// Authorization level of an HTTP trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthLevel {
    Anonymous,
    #[default]
    Function,
    Admin,
}

/// What invokes a function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Trigger {
    Http {
        #[serde(default)]
        methods: Vec<String>,
        #[serde(default)]
        route: Option<String>,
        #[serde(default)]
        auth_level: AuthLevel,
    },
    Timer {
        /// Six-field NCRONTAB expression
        schedule: String,
        #[serde(default)]
        run_on_startup: bool,
    },
    Queue {
        queue_name: String,
        #[serde(default = "default_storage_connection")]
        connection: String,
    },
    Blob {
        path: String,
        #[serde(default = "default_storage_connection")]
        connection: String,
    },
    EventHub {
        event_hub_name: String,
        connection: String,
        #[serde(default)]
        consumer_group: Option<String>,
    },
    ServiceBus {
        #[serde(default)]
        queue_name: Option<String>,
        #[serde(default)]
        topic_name: Option<String>,
        #[serde(default)]
        subscription_name: Option<String>,
        connection: String,
    },
    CosmosDb {
        database_name: String,
        container_name: String,
        connection: String,
        #[serde(default = "default_lease_container")]
        lease_container_name: String,
    },
}

fn default_storage_connection() -> String {
    "AzureWebJobsStorage".to_string()
}

fn default_lease_container() -> String {
    "leases".to_string()
}

fn require(field: &str, value: &str) -> Result<()> {
    ensure!(!value.trim().is_empty(), "'{field}' must not be empty");
    Ok(())
}

fn insert_opt(entry: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        entry.insert(key.to_string(), Value::String(value.clone()));
    }
}

impl Trigger {
    /// Short kind name, as used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http { .. } => "http",
            Self::Timer { .. } => "timer",
            Self::Queue { .. } => "queue",
            Self::Blob { .. } => "blob",
            Self::EventHub { .. } => "eventHub",
            Self::ServiceBus { .. } => "serviceBus",
            Self::CosmosDb { .. } => "cosmosDb",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Http { methods, .. } => {
                for method in methods {
                    if !HTTP_METHODS.contains(&method.to_ascii_lowercase().as_str()) {
                        bail!("Unsupported HTTP method '{method}'");
                    }
                }
                Ok(())
            }
            Self::Timer { schedule, .. } => validate_ncrontab(schedule),
            Self::Queue { queue_name, connection } => {
                require("queueName", queue_name)?;
                require("connection", connection)
            }
            Self::Blob { path, connection } => {
                require("path", path)?;
                require("connection", connection)
            }
            Self::EventHub { event_hub_name, connection, .. } => {
                require("eventHubName", event_hub_name)?;
                require("connection", connection)
            }
            Self::ServiceBus {
                queue_name,
                topic_name,
                subscription_name,
                connection,
            } => {
                require("connection", connection)?;
                match (queue_name, topic_name, subscription_name) {
                    (Some(_), None, None) | (None, Some(_), Some(_)) => Ok(()),
                    _ => bail!("Service Bus trigger needs either queueName or topicName with subscriptionName"),
                }
            }
            Self::CosmosDb {
                database_name,
                container_name,
                connection,
                lease_container_name,
            } => {
                require("databaseName", database_name)?;
                require("containerName", container_name)?;
                require("connection", connection)?;
                require("leaseContainerName", lease_container_name)
            }
        }
    }

    /// The `function.json` entry for this trigger (always `direction: in`).
    pub fn to_binding_descriptor(&self) -> Value {
        let mut entry = Map::new();
        let (binding_type, name) = match self {
            Self::Http {
                methods,
                route,
                auth_level,
            } => {
                let methods: Vec<String> = if methods.is_empty() {
                    vec!["get".to_string(), "post".to_string()]
                } else {
                    methods.iter().map(|m| m.to_ascii_lowercase()).collect()
                };
                entry.insert("methods".into(), json!(methods));
                entry.insert("authLevel".into(), json!(auth_level));
                insert_opt(&mut entry, "route", route);
                ("httpTrigger", "req")
            }
            Self::Timer {
                schedule,
                run_on_startup,
            } => {
                entry.insert("schedule".into(), json!(schedule));
                if *run_on_startup {
                    entry.insert("runOnStartup".into(), json!(true));
                }
                ("timerTrigger", "timer")
            }
            Self::Queue { queue_name, connection } => {
                entry.insert("queueName".into(), json!(queue_name));
                entry.insert("connection".into(), json!(connection));
                ("queueTrigger", "message")
            }
            Self::Blob { path, connection } => {
                entry.insert("path".into(), json!(path));
                entry.insert("connection".into(), json!(connection));
                ("blobTrigger", "blob")
            }
            Self::EventHub {
                event_hub_name,
                connection,
                consumer_group,
            } => {
                entry.insert("eventHubName".into(), json!(event_hub_name));
                entry.insert("connection".into(), json!(connection));
                insert_opt(&mut entry, "consumerGroup", consumer_group);
                ("eventHubTrigger", "events")
            }
            Self::ServiceBus {
                queue_name,
                topic_name,
                subscription_name,
                connection,
            } => {
                insert_opt(&mut entry, "queueName", queue_name);
                insert_opt(&mut entry, "topicName", topic_name);
                insert_opt(&mut entry, "subscriptionName", subscription_name);
                entry.insert("connection".into(), json!(connection));
                ("serviceBusTrigger", "message")
            }
            Self::CosmosDb {
                database_name,
                container_name,
                connection,
                lease_container_name,
            } => {
                entry.insert("databaseName".into(), json!(database_name));
                entry.insert("containerName".into(), json!(container_name));
                entry.insert("connection".into(), json!(connection));
                entry.insert("leaseContainerName".into(), json!(lease_container_name));
                entry.insert("createLeaseContainerIfNotExists".into(), json!(true));
                ("cosmosDBTrigger", "documents")
            }
        };
        descriptor(binding_type, "in", name, entry)
    }
}

fn descriptor(binding_type: &str, direction: &str, name: &str, rest: Map<String, Value>) -> Value {
    let mut entry = Map::new();
    entry.insert("type".into(), json!(binding_type));
    entry.insert("direction".into(), json!(direction));
    entry.insert("name".into(), json!(name));
    entry.extend(rest);
    Value::Object(entry)
}

/// Six whitespace-separated fields: second minute hour day month weekday.
fn validate_ncrontab(schedule: &str) -> Result<()> {
    let fields: Vec<&str> = schedule.split_whitespace().collect();
    ensure!(
        fields.len() == 6,
        "Timer schedule '{schedule}' must have 6 fields (second minute hour day month day-of-week), found {}",
        fields.len()
    );
    for field in fields {
        let valid = field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '*' | '/' | ',' | '-'));
        ensure!(valid, "Timer schedule field '{field}' contains invalid characters");
    }
    Ok(())
}

/// Additional data read when a function runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum InputBinding {
    Blob {
        name: String,
        path: String,
        #[serde(default = "default_storage_connection")]
        connection: String,
    },
    Table {
        name: String,
        table_name: String,
        #[serde(default)]
        partition_key: Option<String>,
        #[serde(default)]
        row_key: Option<String>,
        #[serde(default = "default_storage_connection")]
        connection: String,
    },
    CosmosDb {
        name: String,
        database_name: String,
        container_name: String,
        connection: String,
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        partition_key: Option<String>,
        #[serde(default)]
        sql_query: Option<String>,
    },
}

impl InputBinding {
    pub fn name(&self) -> &str {
        match self {
            Self::Blob { name, .. } | Self::Table { name, .. } | Self::CosmosDb { name, .. } => name,
        }
    }

    pub fn validate(&self) -> Result<()> {
        require("name", self.name())?;
        match self {
            Self::Blob { path, connection, .. } => {
                require("path", path)?;
                require("connection", connection)
            }
            Self::Table { table_name, connection, .. } => {
                require("tableName", table_name)?;
                require("connection", connection)
            }
            Self::CosmosDb {
                database_name,
                container_name,
                connection,
                ..
            } => {
                require("databaseName", database_name)?;
                require("containerName", container_name)?;
                require("connection", connection)
            }
        }
    }

    pub fn to_binding_descriptor(&self) -> Value {
        let mut entry = Map::new();
        let binding_type = match self {
            Self::Blob { path, connection, .. } => {
                entry.insert("path".into(), json!(path));
                entry.insert("connection".into(), json!(connection));
                "blob"
            }
            Self::Table {
                table_name,
                partition_key,
                row_key,
                connection,
                ..
            } => {
                entry.insert("tableName".into(), json!(table_name));
                insert_opt(&mut entry, "partitionKey", partition_key);
                insert_opt(&mut entry, "rowKey", row_key);
                entry.insert("connection".into(), json!(connection));
                "table"
            }
            Self::CosmosDb {
                database_name,
                container_name,
                connection,
                id,
                partition_key,
                sql_query,
                ..
            } => {
                entry.insert("databaseName".into(), json!(database_name));
                entry.insert("containerName".into(), json!(container_name));
                entry.insert("connection".into(), json!(connection));
                insert_opt(&mut entry, "id", id);
                insert_opt(&mut entry, "partitionKey", partition_key);
                insert_opt(&mut entry, "sqlQuery", sql_query);
                "cosmosDB"
            }
        };
        descriptor(binding_type, "in", self.name(), entry)
    }
}

/// Data written when a function completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum OutputBinding {
    Blob {
        name: String,
        path: String,
        #[serde(default = "default_storage_connection")]
        connection: String,
    },
    Queue {
        name: String,
        queue_name: String,
        #[serde(default = "default_storage_connection")]
        connection: String,
    },
    Table {
        name: String,
        table_name: String,
        #[serde(default = "default_storage_connection")]
        connection: String,
    },
    CosmosDb {
        name: String,
        database_name: String,
        container_name: String,
        connection: String,
    },
    ServiceBus {
        name: String,
        #[serde(default)]
        queue_name: Option<String>,
        #[serde(default)]
        topic_name: Option<String>,
        connection: String,
    },
    EventHub {
        name: String,
        event_hub_name: String,
        connection: String,
    },
    Http {
        #[serde(default = "default_http_output_name")]
        name: String,
    },
}

fn default_http_output_name() -> String {
    "res".to_string()
}

impl OutputBinding {
    pub fn name(&self) -> &str {
        match self {
            Self::Blob { name, .. }
            | Self::Queue { name, .. }
            | Self::Table { name, .. }
            | Self::CosmosDb { name, .. }
            | Self::ServiceBus { name, .. }
            | Self::EventHub { name, .. }
            | Self::Http { name } => name,
        }
    }

    pub fn validate(&self) -> Result<()> {
        require("name", self.name())?;
        match self {
            Self::Blob { path, connection, .. } => {
                require("path", path)?;
                require("connection", connection)
            }
            Self::Queue { queue_name, connection, .. } => {
                require("queueName", queue_name)?;
                require("connection", connection)
            }
            Self::Table { table_name, connection, .. } => {
                require("tableName", table_name)?;
                require("connection", connection)
            }
            Self::CosmosDb {
                database_name,
                container_name,
                connection,
                ..
            } => {
                require("databaseName", database_name)?;
                require("containerName", container_name)?;
                require("connection", connection)
            }
            Self::ServiceBus {
                queue_name,
                topic_name,
                connection,
                ..
            } => {
                require("connection", connection)?;
                ensure!(
                    queue_name.is_some() != topic_name.is_some(),
                    "Service Bus output needs exactly one of queueName or topicName"
                );
                Ok(())
            }
            Self::EventHub {
                event_hub_name,
                connection,
                ..
            } => {
                require("eventHubName", event_hub_name)?;
                require("connection", connection)
            }
            Self::Http { .. } => Ok(()),
        }
    }

    pub fn to_binding_descriptor(&self) -> Value {
        let mut entry = Map::new();
        let binding_type = match self {
            Self::Blob { path, connection, .. } => {
                entry.insert("path".into(), json!(path));
                entry.insert("connection".into(), json!(connection));
                "blob"
            }
            Self::Queue {
                queue_name,
                connection,
                ..
            } => {
                entry.insert("queueName".into(), json!(queue_name));
                entry.insert("connection".into(), json!(connection));
                "queue"
            }
            Self::Table {
                table_name,
                connection,
                ..
            } => {
                entry.insert("tableName".into(), json!(table_name));
                entry.insert("connection".into(), json!(connection));
                "table"
            }
            Self::CosmosDb {
                database_name,
                container_name,
                connection,
                ..
            } => {
                entry.insert("databaseName".into(), json!(database_name));
                entry.insert("containerName".into(), json!(container_name));
                entry.insert("connection".into(), json!(connection));
                "cosmosDB"
            }
            Self::ServiceBus {
                queue_name,
                topic_name,
                connection,
                ..
            } => {
                insert_opt(&mut entry, "queueName", queue_name);
                insert_opt(&mut entry, "topicName", topic_name);
                entry.insert("connection".into(), json!(connection));
                "serviceBus"
            }
            Self::EventHub {
                event_hub_name,
                connection,
                ..
            } => {
                entry.insert("eventHubName".into(), json!(event_hub_name));
                entry.insert("connection".into(), json!(connection));
                "eventHub"
            }
            Self::Http { .. } => "http",
        };
        descriptor(binding_type, "out", self.name(), entry)
    }
}

/// The `bindings` array of `function.json`: trigger first, then inputs, then outputs.
///
/// An HTTP trigger without an explicit HTTP output gets the default `res` output.
pub fn binding_descriptors(
    trigger: &Trigger,
    inputs: &[InputBinding],
    outputs: &[OutputBinding],
) -> Vec<Value> {
    let mut bindings = vec![trigger.to_binding_descriptor()];
    bindings.extend(inputs.iter().map(InputBinding::to_binding_descriptor));
    bindings.extend(outputs.iter().map(OutputBinding::to_binding_descriptor));

    let has_http_output = outputs.iter().any(|o| matches!(o, OutputBinding::Http { .. }));
    if matches!(trigger, Trigger::Http { .. }) && !has_http_output {
        bindings.push(
            OutputBinding::Http {
                name: default_http_output_name(),
            }
            .to_binding_descriptor(),
        );
    }
    bindings
}

/// Validate a trigger and all its bindings, collecting every problem.
pub fn validate_bindings(
    trigger: &Trigger,
    inputs: &[InputBinding],
    outputs: &[OutputBinding],
) -> Result<()> {
    let mut problems = Vec::new();
    if let Err(e) = trigger.validate() {
        problems.push(format!("{} trigger: {e}", trigger.kind()));
    }
    for input in inputs {
        if let Err(e) = input.validate() {
            problems.push(format!("input '{}': {e}", input.name()));
        }
    }
    for output in outputs {
        if let Err(e) = output.validate() {
            problems.push(format!("output '{}': {e}", output.name()));
        }
    }
    if !problems.is_empty() {
        bail!("{}", problems.join("; "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_deserializes_from_yaml() {
        let trigger: Trigger = serde_yaml::from_str("type: timer\nschedule: '0 */5 * * * *'\n").unwrap();
        assert!(trigger.validate().is_ok());
        assert_eq!(trigger.to_binding_descriptor()["type"], "timerTrigger");

        let http: Trigger = serde_yaml::from_str("type: http\nmethods: [GET]\nauthLevel: anonymous\n").unwrap();
        let descriptor = http.to_binding_descriptor();
        assert_eq!(descriptor["direction"], "in");
        assert_eq!(descriptor["methods"], json!(["get"]));
        assert_eq!(descriptor["authLevel"], "anonymous");
    }

    #[test]
    fn test_timer_schedule_needs_six_fields() {
        let trigger = Trigger::Timer {
            schedule: "*/5 * * * *".to_string(),
            run_on_startup: false,
        };
        let err = trigger.validate().unwrap_err();
        assert!(err.to_string().contains("6 fields"));
    }

    #[test]
    fn test_invalid_http_method() {
        let trigger = Trigger::Http {
            methods: vec!["fetch".to_string()],
            route: None,
            auth_level: AuthLevel::Function,
        };
        assert!(trigger.validate().is_err());
    }

    #[test]
    fn test_descriptors_list_trigger_first() {
        let trigger = Trigger::Queue {
            queue_name: "orders".to_string(),
            connection: default_storage_connection(),
        };
        let inputs = vec![InputBinding::Blob {
            name: "template".to_string(),
            path: "templates/order.json".to_string(),
            connection: default_storage_connection(),
        }];
        let outputs = vec![OutputBinding::Table {
            name: "ledger".to_string(),
            table_name: "Ledger".to_string(),
            connection: default_storage_connection(),
        }];

        let bindings = binding_descriptors(&trigger, &inputs, &outputs);
        let kinds: Vec<&str> = bindings.iter().map(|b| b["type"].as_str().unwrap()).collect();
        assert_eq!(kinds, vec!["queueTrigger", "blob", "table"]);
        assert_eq!(bindings[2]["direction"], "out");
    }

    #[test]
    fn test_http_trigger_gets_default_response_binding() {
        let trigger = Trigger::Http {
            methods: vec![],
            route: Some("orders/{id}".to_string()),
            auth_level: AuthLevel::Anonymous,
        };
        let bindings = binding_descriptors(&trigger, &[], &[]);
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[1], json!({"type": "http", "direction": "out", "name": "res"}));
    }

    #[test]
    fn test_validate_bindings_collects_all_problems() {
        let trigger = Trigger::ServiceBus {
            queue_name: None,
            topic_name: Some("events".to_string()),
            subscription_name: None,
            connection: "Bus".to_string(),
        };
        let outputs = vec![OutputBinding::Queue {
            name: "out".to_string(),
            queue_name: String::new(),
            connection: default_storage_connection(),
        }];

        let err = validate_bindings(&trigger, &[], &outputs).unwrap_err().to_string();
        assert!(err.contains("serviceBus trigger"));
        assert!(err.contains("output 'out'"));
    }
}
