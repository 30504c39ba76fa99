//! Schema-checks transition records and step results before the State
//! Manager commits them. Pure with respect to persistence: nothing here
//! touches a store.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use jsonschema::Validator as JsonSchemaValidator;
use serde_json::Value as Json;
use tokio::sync::RwLock;

use orch_domain::state_token::StateToken;

/// One validation failure, with a JSON-pointer-ish path into the
/// checked value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

/// Outcome of a validation pass; mirrors the `{valid, errors[]}` shape
/// callers consult before deciding whether to commit a write.
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub errors: Vec<ValidationIssue>,
}

impl ValidationOutcome {
    #[must_use]
    pub fn ok() -> Self {
        Self { errors: Vec::new() }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationIssue {
            path: path.into(),
            message: message.into(),
        });
    }
}

fn transition_record_schema() -> &'static Json {
    static SCHEMA: OnceLock<Json> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        serde_json::json!({
            "type": "object",
            "required": ["taskId", "fromState", "toState", "timestamp"],
            "properties": {
                "taskId": {"type": "string", "minLength": 1},
                "fromState": {"type": "string", "minLength": 1},
                "toState": {"type": "string", "minLength": 1},
                "message": {"type": ["string", "null"]},
                "timestamp": {"type": "string", "minLength": 1},
            }
        })
    })
}

fn step_result_schema() -> &'static Json {
    static SCHEMA: OnceLock<Json> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        serde_json::json!({
            "type": "object",
            "required": ["success", "summary", "timestamp"],
            "properties": {
                "success": {"type": "boolean"},
                "summary": {"type": "string"},
                "timestamp": {"type": "string", "minLength": 1},
                "durationMs": {"type": "integer", "minimum": 0},
            }
        })
    })
}

/// Compiles and caches JSON Schema validators, matching the compile-once
/// cache-by-hash shape used elsewhere in this stack's schema tooling.
pub struct Validator {
    max_metadata_bytes: usize,
    compiled: RwLock<HashMap<u64, Arc<JsonSchemaValidator>>>,
}

impl Validator {
    #[must_use]
    pub fn new(max_metadata_bytes: usize) -> Self {
        Self {
            max_metadata_bytes,
            compiled: RwLock::new(HashMap::new()),
        }
    }

    async fn compiled_for(&self, schema: &Json) -> Arc<JsonSchemaValidator> {
        let key = hash_schema(schema);
        if let Some(v) = self.compiled.read().await.get(&key) {
            return Arc::clone(v);
        }
        let compiled =
            Arc::new(jsonschema::validator_for(schema).expect("static schemas are well-formed"));
        self.compiled
            .write()
            .await
            .insert(key, Arc::clone(&compiled));
        compiled
    }

    /// Validate a transition record prior to the State Manager committing
    /// it. Checks required fields, that both state tokens belong to the
    /// closed enumeration, and the metadata size limit.
    pub async fn validate_transition_record(
        &self,
        raw: &Json,
        metadata: &Json,
    ) -> ValidationOutcome {
        let mut outcome = self.check_schema(raw, transition_record_schema()).await;
        self.check_state_token_field(raw, "fromState", &mut outcome);
        self.check_state_token_field(raw, "toState", &mut outcome);
        self.check_metadata_size(metadata, &mut outcome);
        outcome
    }

    /// Validate a step result prior to the Context Store merging it.
    pub async fn validate_step_result(&self, raw: &Json, payload: &Json) -> ValidationOutcome {
        let mut outcome = self.check_schema(raw, step_result_schema()).await;
        self.check_metadata_size(payload, &mut outcome);
        outcome
    }

    async fn check_schema(&self, raw: &Json, schema: &Json) -> ValidationOutcome {
        let compiled = self.compiled_for(schema).await;
        let mut outcome = ValidationOutcome::ok();
        for err in compiled.iter_errors(raw) {
            outcome.push(err.instance_path.to_string(), err.to_string());
        }
        outcome
    }

    fn check_state_token_field(&self, raw: &Json, field: &str, outcome: &mut ValidationOutcome) {
        let Some(value) = raw.get(field).and_then(Json::as_str) else {
            return;
        };
        if value.parse::<StateToken>().is_err() {
            outcome.push(format!("/{field}"), format!("unknown state token: {value}"));
        }
    }

    fn check_metadata_size(&self, metadata: &Json, outcome: &mut ValidationOutcome) {
        let size = serde_json::to_vec(metadata).map(|v| v.len()).unwrap_or(0);
        if size > self.max_metadata_bytes {
            outcome.push(
                "/metadata",
                format!(
                    "metadata is {size} bytes, exceeds configured limit of {}",
                    self.max_metadata_bytes
                ),
            );
        }
    }
}

fn hash_schema(schema: &Json) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    schema.to_string().hash(&mut hasher);
    hasher.finish()
}
