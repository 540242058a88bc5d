//! Credential read and write commands

use anyhow::{Context, Result};
use serde_json::{json, Value};

use crate::cli::{GetArgs, GlobalArgs, NameArgs, PutArgs};
use crate::context::AppContext;
use crate::output;

pub async fn put(args: PutArgs, global: &GlobalArgs) -> Result<()> {
    let body = put_body(args)?;
    let ctx = AppContext::open(global).await?;
    let stored = ctx.service.store(&ctx.caller, &body).await?;
    output::json(&stored)
}

/// Build the request body for `put` from its flags
fn put_body(args: PutArgs) -> Result<Value> {
    let mut body = json!({
        "name": args.name,
        "type": args.kind,
    });
    if args.overwrite {
        body["overwrite"] = json!(true);
    }
    if let Some(value) = args.value {
        body["value"] = json!(value);
    }
    if let Some(raw) = args.value_json {
        body["value"] = serde_json::from_str(&raw).context("--value-json is not valid JSON")?;
    }
    if let Some(raw) = args.parameters {
        body["parameters"] = serde_json::from_str(&raw).context("--parameters is not valid JSON")?;
    }
    Ok(body)
}

pub async fn get(args: GetArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = AppContext::open(global).await?;
    if args.history {
        let history = ctx.service.fetch_history(&ctx.caller, &args.name).await?;
        return output::json(&history);
    }

    let stored = if args.id {
        ctx.service.fetch_by_id(&ctx.caller, &args.name).await?
    } else {
        ctx.service.fetch_by_name(&ctx.caller, &args.name).await?
    };
    output::json(&stored)
}

pub async fn delete(args: NameArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = AppContext::open(global).await?;
    ctx.service.delete(&ctx.caller, &args.name).await?;
    output::success(&format!("Deleted {}", args.name));
    Ok(())
}

pub async fn regenerate(args: NameArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = AppContext::open(global).await?;
    let stored = ctx.service.regenerate(&ctx.caller, &args.name).await?;
    output::json(&stored)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(kind: &str) -> PutArgs {
        PutArgs {
            name: "/app/secret".into(),
            kind: kind.into(),
            value: None,
            value_json: None,
            parameters: None,
            overwrite: false,
        }
    }

    #[test]
    fn test_put_body_generate() {
        let body = put_body(PutArgs {
            parameters: Some(r#"{"length": 40}"#.into()),
            overwrite: true,
            ..args("password")
        })
        .unwrap();
        assert_eq!(
            body,
            json!({"name": "/app/secret", "type": "password", "overwrite": true, "parameters": {"length": 40}})
        );
    }

    #[test]
    fn test_put_body_structured_value() {
        let body = put_body(PutArgs {
            value_json: Some(r#"{"certificate": "C", "private_key": "K"}"#.into()),
            ..args("root")
        })
        .unwrap();
        assert_eq!(body["value"]["certificate"], "C");
        assert!(body.get("overwrite").is_none());
    }

    #[test]
    fn test_put_body_rejects_bad_json() {
        let err = put_body(PutArgs {
            parameters: Some("{length".into()),
            ..args("password")
        })
        .unwrap_err();
        assert!(err.to_string().contains("--parameters"));
    }
}
