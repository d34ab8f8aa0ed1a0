use std::path::PathBuf;

use serde::Deserialize;
use serde_json::json;

use crate::error::{SchemaError, ToolError};
use crate::gmail::GmailClient;
use crate::session::FailurePolicy;
use crate::tools::{ToolOutcome, ToolSpec, parse_args};

const CLIENT: &str = "GmailClient";

/// Gmail tools; each expects a [`GmailClient`] in the dependency map.
pub fn all_tools() -> Result<Vec<ToolSpec>, SchemaError> {
    Ok(vec![
        send_email_tool()?,
        search_emails_tool()?,
        get_email_tool()?,
        delete_email_tool()?,
        list_labels_tool()?,
    ])
}

fn on_error_schema() -> serde_json::Value {
    json!({"type": "string", "enum": ["propagate", "empty_on_error"]})
}

#[derive(Debug, Deserialize)]
struct SendEmailArgs {
    to: String,
    subject: String,
    message_text: String,
    #[serde(default)]
    files: Vec<PathBuf>,
}

pub fn send_email_tool() -> Result<ToolSpec, SchemaError> {
    Ok(ToolSpec::new(
        "send_email",
        "Send a plain-text email, optionally with file attachments. `to` may list several comma-separated addresses.",
    )
    .with_schema(json!({
        "type": "object",
        "properties": {
            "to": {"type": "string"},
            "subject": {"type": "string"},
            "message_text": {"type": "string"},
            "files": {"type": "array", "items": {"type": "string"}}
        },
        "required": ["to", "subject", "message_text"],
        "additionalProperties": false
    }))?
    .with_handler(|args, deps| {
        let args = parse_args::<SendEmailArgs>("send_email", args);
        let client = deps.require::<GmailClient>(CLIENT);

        async move {
            let args = args?;
            let sent = client?
                .send(&args.to, &args.subject, &args.message_text, &args.files)
                .await?;
            ToolOutcome::json(&sent)
        }
    }))
}

#[derive(Debug, Deserialize)]
struct SearchEmailsArgs {
    query: String,
    #[serde(default = "default_max_results")]
    max_results: usize,
    #[serde(default)]
    page_token: Option<String>,
    #[serde(default)]
    on_error: FailurePolicy,
}

fn default_max_results() -> usize {
    10
}

pub fn search_emails_tool() -> Result<ToolSpec, SchemaError> {
    Ok(ToolSpec::new(
        "search_emails",
        "Search the mailbox with Gmail query syntax and return the matching messages in full.",
    )
    .with_schema(json!({
        "type": "object",
        "properties": {
            "query": {"type": "string"},
            "max_results": {"type": "integer"},
            "page_token": {"type": "string"},
            "on_error": on_error_schema()
        },
        "required": ["query"],
        "additionalProperties": false
    }))?
    .with_handler(|args, deps| {
        let args = parse_args::<SearchEmailsArgs>("search_emails", args);
        let client = deps.require::<GmailClient>(CLIENT);

        async move {
            let args = args?;
            let found = client?
                .search(
                    &args.query,
                    args.max_results,
                    args.page_token.as_deref(),
                    args.on_error,
                )
                .await?;
            ToolOutcome::json(&found)
        }
    }))
}

#[derive(Debug, Deserialize)]
struct GetEmailArgs {
    msg_id: String,
}

#[derive(Debug, Deserialize)]
struct DeleteEmailArgs {
    msg_id: String,
    #[serde(default)]
    on_error: FailurePolicy,
}

pub fn get_email_tool() -> Result<ToolSpec, SchemaError> {
    Ok(ToolSpec::new("get_email", "Fetch one message by id.")
        .with_schema(json!({
            "type": "object",
            "properties": {
                "msg_id": {"type": "string"}
            },
            "required": ["msg_id"],
            "additionalProperties": false
        }))?
        .with_handler(|args, deps| {
            let args = parse_args::<GetEmailArgs>("get_email", args);
            let client = deps.require::<GmailClient>(CLIENT);

            async move {
                let message = client?.get(&args?.msg_id).await?;
                ToolOutcome::json(&message)
            }
        }))
}

pub fn delete_email_tool() -> Result<ToolSpec, SchemaError> {
    Ok(ToolSpec::new("delete_email", "Move a message to the trash.")
        .with_schema(json!({
            "type": "object",
            "properties": {
                "msg_id": {"type": "string"},
                "on_error": on_error_schema()
            },
            "required": ["msg_id"],
            "additionalProperties": false
        }))?
        .with_handler(|args, deps| {
            let args = parse_args::<DeleteEmailArgs>("delete_email", args);
            let client = deps.require::<GmailClient>(CLIENT);

            async move {
                let args = args?;
                client?.delete(&args.msg_id, args.on_error).await?;
                Ok::<_, ToolError>(ToolOutcome::Empty)
            }
        }))
}

#[derive(Debug, Deserialize)]
struct ListLabelsArgs {
    #[serde(default)]
    on_error: FailurePolicy,
}

pub fn list_labels_tool() -> Result<ToolSpec, SchemaError> {
    Ok(ToolSpec::new("list_labels", "List the mailbox labels.")
        .with_schema(json!({
            "type": "object",
            "properties": {
                "on_error": on_error_schema()
            },
            "required": [],
            "additionalProperties": false
        }))?
        .with_handler(|args, deps| {
            let args = parse_args::<ListLabelsArgs>("list_labels", args);
            let client = deps.require::<GmailClient>(CLIENT);

            async move {
                let labels = client?.list_labels(args?.on_error).await?;
                ToolOutcome::json(&labels)
            }
        }))
}
