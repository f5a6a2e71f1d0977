use anyhow::Result;
use serde_json::{json, Map, Value};

use crate::context::Context;
use crate::logging::{log, LogLevel};
use crate::params::{AdditionalFields, Fields};
use crate::reduce::reduce_pairs;
use crate::target::Target;
use crate::timestamp::normalize;

pub const EVENT_CREATE_ALIAS: &str = "$create_alias";
pub const EVENT_IDENTIFY: &str = "$identify";

const PROTECTED_KEYS: [&str; 2] = ["event", "type"];

/// One ingestion record. Builders fill only the slots their resource owns;
/// `extra` carries the caller overlay and is rendered last, so its entries
/// replace same-named slots. `event` and `type` never come from the overlay.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Payload {
    pub event: String,
    pub kind: Option<String>,
    pub name: Option<Value>,
    pub distinct_id: Option<Value>,
    pub properties: Option<Map<String, Value>>,
    pub context: Option<Map<String, Value>>,
    pub extra: Map<String, Value>,
}

impl Payload {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            ..Self::default()
        }
    }

    pub fn into_value(self) -> Value {
        let mut out = Map::new();
        out.insert("event".to_string(), Value::String(self.event));
        if let Some(kind) = self.kind {
            out.insert("type".to_string(), Value::String(kind));
        }
        if let Some(name) = self.name {
            out.insert("name".to_string(), name);
        }
        if let Some(distinct_id) = self.distinct_id {
            out.insert("distinct_id".to_string(), distinct_id);
        }
        if let Some(properties) = self.properties {
            out.insert("properties".to_string(), Value::Object(properties));
        }
        if let Some(context) = self.context {
            out.insert("context".to_string(), Value::Object(context));
        }
        for (key, value) in self.extra {
            out.insert(key, value);
        }
        Value::Object(out)
    }

    fn merge_overlay(&mut self, ctx: &Context, overlay: Map<String, Value>) {
        for (key, value) in overlay {
            if PROTECTED_KEYS.contains(&key.as_str()) {
                log(
                    ctx,
                    LogLevel::Warn,
                    "ignoring additional field that would replace the payload discriminator",
                    Some(json!({ "field": key, "value": value })),
                );
                continue;
            }
            self.extra.insert(key, value);
        }
    }
}

/// Builds the payload for one input item of `fields.target()`.
pub fn build_payload(ctx: &Context, fields: &Fields<'_>) -> Result<Payload> {
    match fields.target() {
        Target::AliasCreate => build_alias(ctx, fields),
        Target::EventCreate => build_event(ctx, fields),
        Target::IdentityCreate => build_identity(ctx, fields),
        Target::TrackPage | Target::TrackScreen => build_track(ctx, fields),
    }
}

pub fn build_alias(ctx: &Context, fields: &Fields<'_>) -> Result<Payload> {
    let distinct_id = fields.required_string("distinctId")?;
    let alias = fields.required_string("alias")?;
    let additional = fields.additional_fields()?;

    let mut properties = Map::new();
    properties.insert("distinct_id".to_string(), Value::String(distinct_id));
    properties.insert("alias".to_string(), Value::String(alias));

    let mut payload = Payload::new(EVENT_CREATE_ALIAS);
    payload.kind = Some("alias".to_string());
    payload.properties = Some(properties);
    payload.context = Some(reduce_pairs(&additional.context));
    finish(ctx, payload, additional)
}

pub fn build_event(ctx: &Context, fields: &Fields<'_>) -> Result<Payload> {
    let event_name = fields.required_string("eventName")?;
    let distinct_id = fields.required_string("distinctId")?;
    let additional = fields.additional_fields()?;

    let mut properties = reduce_pairs(&additional.properties);
    properties.insert("distinct_id".to_string(), Value::String(distinct_id));

    let mut payload = Payload::new(event_name);
    payload.properties = Some(properties);
    finish(ctx, payload, additional)
}

pub fn build_identity(ctx: &Context, fields: &Fields<'_>) -> Result<Payload> {
    let distinct_id = fields.required_string("distinctId")?;
    let additional = fields.additional_fields()?;

    let mut payload = Payload::new(EVENT_IDENTIFY);
    payload.distinct_id = Some(Value::String(distinct_id));
    payload.properties = Some(reduce_pairs(&additional.properties));
    finish(ctx, payload, additional)
}

pub fn build_track(ctx: &Context, fields: &Fields<'_>) -> Result<Payload> {
    let distinct_id = fields.required_string("distinctId")?;
    let name = fields.required_string("name")?;
    let additional = fields.additional_fields()?;
    let operation = fields.target().operation().as_str();

    let mut payload = Payload::new(format!("${operation}"));
    payload.kind = Some(operation.to_string());
    payload.name = Some(Value::String(name));
    payload.distinct_id = Some(Value::String(distinct_id));
    payload.context = Some(reduce_pairs(&additional.context));
    payload.properties = Some(reduce_pairs(&additional.properties));
    finish(ctx, payload, additional)
}

fn finish(ctx: &Context, mut payload: Payload, additional: AdditionalFields) -> Result<Payload> {
    let timestamp = normalize(additional.timestamp.as_deref())?;
    payload.merge_overlay(ctx, additional.rest);
    if let Some(timestamp) = timestamp {
        payload
            .extra
            .insert("timestamp".to_string(), Value::String(timestamp));
    }
    Ok(payload)
}
