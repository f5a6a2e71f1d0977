use anyhow::Result;
use serde::Serialize;
use serde_json::{json, Value};

use crate::client::ApiRequest;
use crate::context::Context;
use crate::error::DispatchError;
use crate::logging::{log, with_log_tags, LogLevel};
use crate::params::{Fields, ParameterSource, PARAM_OPERATION, PARAM_RESOURCE};
use crate::payload::{build_payload, Payload};
use crate::target::{Resource, Target};

pub const METHOD_POST: &str = "POST";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Report a failed non-batched item as `{ "error": ... }` and keep going
    /// instead of aborting the invocation.
    pub continue_on_fail: bool,
}

/// A request body ready for the ingestion API, as produced by [`preview`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PreparedRequest {
    pub method: &'static str,
    pub path: &'static str,
    pub body: Value,
}

/// Routes input items to the payload builders and hands the results to the
/// API client: one request per item for alias, identity and track, a single
/// `/capture` batch for events.
pub struct Dispatcher<C> {
    client: C,
    options: DispatchOptions,
}

impl<C: ApiRequest> Dispatcher<C> {
    pub fn new(client: C) -> Self {
        Self::with_options(client, DispatchOptions::default())
    }

    pub fn with_options(client: C, options: DispatchOptions) -> Self {
        Self { client, options }
    }

    pub fn run(
        &self,
        ctx: &mut Context,
        source: &dyn ParameterSource,
        resource: &str,
        operation: &str,
    ) -> Result<Vec<Value>> {
        let target = Target::resolve(resource, operation)?;
        self.run_target(ctx, source, target)
    }

    /// Like [`Dispatcher::run`], reading `resource` and `operation` from the
    /// source itself.
    pub fn run_node(&self, ctx: &mut Context, source: &dyn ParameterSource) -> Result<Vec<Value>> {
        let target = node_target(source)?;
        self.run_target(ctx, source, target)
    }

    pub fn run_target(
        &self,
        ctx: &mut Context,
        source: &dyn ParameterSource,
        target: Target,
    ) -> Result<Vec<Value>> {
        let tags = json!({
            "resource": target.resource().as_str(),
            "operation": target.operation().as_str()
        });
        with_log_tags(ctx, tags, |ctx| {
            if target.is_batched() {
                self.run_batched(ctx, source, target)
            } else {
                self.run_each(ctx, source, target)
            }
        })
    }

    fn run_each(
        &self,
        ctx: &mut Context,
        source: &dyn ParameterSource,
        target: Target,
    ) -> Result<Vec<Value>> {
        let count = source.item_count();
        let mut responses = Vec::with_capacity(count);
        for index in 0..count {
            ctx.ensure_not_cancelled()?;
            let payload = match build_item(ctx, source, target, index) {
                Ok(payload) => payload,
                Err(err) if self.options.continue_on_fail && is_item_error(&err) => {
                    log(
                        ctx,
                        LogLevel::Error,
                        "item skipped",
                        Some(json!({ "item": index, "error": err.to_string() })),
                    );
                    responses.push(json!({ "error": err.to_string() }));
                    continue;
                }
                Err(err) => return Err(err),
            };
            responses.push(self.submit(ctx, target, payload.into_value())?);
        }
        Ok(responses)
    }

    fn run_batched(
        &self,
        ctx: &mut Context,
        source: &dyn ParameterSource,
        target: Target,
    ) -> Result<Vec<Value>> {
        let batch = build_batch(ctx, source, target)?;
        if batch.is_empty() {
            log(ctx, LogLevel::Info, "no items to capture", None);
            return Ok(Vec::new());
        }
        log(
            ctx,
            LogLevel::Info,
            "submitting event batch",
            Some(json!({ "size": batch.len() })),
        );
        let response = self.submit(ctx, target, json!({ "batch": batch }))?;
        Ok(vec![response])
    }

    fn submit(&self, ctx: &Context, target: Target, body: Value) -> Result<Value> {
        ctx.ensure_not_cancelled()?;
        log(
            ctx,
            LogLevel::Debug,
            "submitting payload",
            Some(json!({ "method": METHOD_POST, "path": target.path() })),
        );
        self.client.submit(METHOD_POST, target.path(), body)
    }
}

/// Builds every request body for `target` without submitting anything.
pub fn preview(
    ctx: &mut Context,
    source: &dyn ParameterSource,
    target: Target,
) -> Result<Vec<PreparedRequest>> {
    let prepared = |body| PreparedRequest {
        method: METHOD_POST,
        path: target.path(),
        body,
    };
    if target.is_batched() {
        let batch = build_batch(ctx, source, target)?;
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        return Ok(vec![prepared(json!({ "batch": batch }))]);
    }
    let mut requests = Vec::with_capacity(source.item_count());
    for index in 0..source.item_count() {
        ctx.ensure_not_cancelled()?;
        let payload = build_item(ctx, source, target, index)?;
        requests.push(prepared(payload.into_value()));
    }
    Ok(requests)
}

/// Resolves the node-level `resource` / `operation` parameters. Resource
/// defaults to `event`; operation defaults per resource.
pub fn node_target(source: &dyn ParameterSource) -> Result<Target> {
    resolve_target(source, None, None)
}

/// Like [`node_target`], but explicit `resource` / `operation` values win over
/// anything the source carries, shared or per item.
pub fn resolve_target(
    source: &dyn ParameterSource,
    resource: Option<&str>,
    operation: Option<&str>,
) -> Result<Target> {
    let resource = match resource {
        Some(resource) => resource.to_string(),
        None => node_string(source, PARAM_RESOURCE)?
            .unwrap_or_else(|| Resource::Event.as_str().to_string()),
    };
    let operation = match operation {
        Some(operation) => operation.to_string(),
        None => match node_string(source, PARAM_OPERATION)? {
            Some(operation) => operation,
            None => resource
                .parse::<Resource>()
                .map(|parsed| parsed.default_operation().as_str().to_string())
                .unwrap_or_default(),
        },
    };
    Ok(Target::resolve(&resource, &operation)?)
}

fn node_string(source: &dyn ParameterSource, name: &str) -> Result<Option<String>> {
    match source.parameter(name, 0)? {
        None => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(_) => Err(DispatchError::invalid(name, "node", "expected a string").into()),
    }
}

fn build_item(
    ctx: &mut Context,
    source: &dyn ParameterSource,
    target: Target,
    index: usize,
) -> Result<Payload> {
    with_log_tags(ctx, json!({ "item": index }), |ctx| {
        let fields = Fields::new(source, index, target);
        build_payload(ctx, &fields)
    })
}

/// Any failing item aborts the whole batch; there is no partial capture.
fn build_batch(
    ctx: &mut Context,
    source: &dyn ParameterSource,
    target: Target,
) -> Result<Vec<Value>> {
    let mut batch = Vec::with_capacity(source.item_count());
    for index in 0..source.item_count() {
        ctx.ensure_not_cancelled()?;
        let payload = build_item(ctx, source, target, index).map_err(|err| {
            log(
                ctx,
                LogLevel::Error,
                "event batch aborted",
                Some(json!({ "item": index, "error": err.to_string() })),
            );
            err
        })?;
        batch.push(payload.into_value());
    }
    Ok(batch)
}

fn is_item_error(err: &anyhow::Error) -> bool {
    err.downcast_ref::<DispatchError>()
        .is_some_and(|inner| !inner.is_transport())
}
