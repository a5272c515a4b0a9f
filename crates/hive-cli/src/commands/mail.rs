use anyhow::{Context, Result};
use clap::Subcommand;
use hive::{Hive, MessageTarget, MessageType, SendRequest};
use serde_json::{json, Value};

use super::{parse_payload, to_output};

#[derive(Subcommand)]
pub enum MailCommand {
    /// Send a message to an agent, or to everyone with `--to broadcast`
    Send {
        #[arg(long, value_name = "AGENT_ID")]
        from: String,

        #[arg(long, value_name = "AGENT_ID")]
        to: String,

        /// request, response, notification, file-share or task-update
        #[arg(short = 't', long = "type", default_value = "request")]
        message_type: MessageType,

        /// JSON payload (plain text is sent as a string)
        #[arg(value_name = "CONTENT")]
        content: String,

        /// Message this one answers
        #[arg(long, value_name = "MESSAGE_ID")]
        reply_to: Option<String>,
    },

    /// Reply to the sender of a message
    Reply {
        #[arg(value_name = "MESSAGE_ID")]
        message_id: String,

        #[arg(long, value_name = "AGENT_ID")]
        from: String,

        #[arg(value_name = "CONTENT")]
        content: String,

        #[arg(short = 't', long = "type", default_value = "response")]
        message_type: MessageType,
    },

    /// Share a file path
    Share {
        #[arg(long, value_name = "AGENT_ID")]
        from: String,

        #[arg(long, value_name = "AGENT_ID")]
        to: String,

        #[arg(value_name = "PATH")]
        path: String,

        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Messages addressed to an agent
    Inbox {
        #[arg(value_name = "AGENT_ID")]
        agent_id: String,

        /// Only messages not yet marked read
        #[arg(short, long)]
        unread: bool,
    },

    /// Mark a message read for an agent
    Read {
        #[arg(value_name = "MESSAGE_ID")]
        message_id: String,

        #[arg(value_name = "AGENT_ID")]
        agent_id: String,
    },

    /// Mark every message of an agent read
    ReadAll {
        #[arg(value_name = "AGENT_ID")]
        agent_id: String,
    },

    /// A message and all replies to it
    Thread {
        #[arg(value_name = "MESSAGE_ID")]
        message_id: String,
    },
}

pub fn handle_command(hive: &Hive, command: MailCommand) -> Result<Value> {
    let mailbox = hive.mailbox();
    match command {
        MailCommand::Send {
            from,
            to,
            message_type,
            content,
            reply_to,
        } => {
            let mut request = SendRequest::new(
                from,
                MessageTarget::from(to),
                message_type,
                parse_payload(&content),
            );
            if let Some(original) = reply_to {
                request = request.with_reply_to(original);
            }
            let id = mailbox.send(request).context("Failed to send message")?;
            Ok(json!({ "messageId": id }))
        }
        MailCommand::Reply {
            message_id,
            from,
            content,
            message_type,
        } => {
            let id = mailbox
                .reply_with_type(&message_id, &from, parse_payload(&content), message_type)
                .with_context(|| format!("Failed to reply to {}", message_id))?;
            Ok(json!({ "messageId": id }))
        }
        MailCommand::Share {
            from,
            to,
            path,
            description,
        } => {
            let id = mailbox
                .share_file(&from, MessageTarget::from(to), &path, &description)
                .context("Failed to share file")?;
            Ok(json!({ "messageId": id }))
        }
        MailCommand::Inbox { agent_id, unread } => {
            let messages = if unread {
                mailbox.unread_for(&agent_id)
            } else {
                mailbox.messages_for(&agent_id)
            }
            .with_context(|| format!("Failed to read inbox of {}", agent_id))?;
            to_output(&messages)
        }
        MailCommand::Read {
            message_id,
            agent_id,
        } => {
            mailbox.mark_read(&message_id, &agent_id)?;
            Ok(json!({ "messageId": message_id, "agentId": agent_id, "read": true }))
        }
        MailCommand::ReadAll { agent_id } => {
            let marked = mailbox.mark_all_read(&agent_id)?;
            Ok(json!({ "agentId": agent_id, "marked": marked }))
        }
        MailCommand::Thread { message_id } => {
            let thread = mailbox.thread(&message_id)?;
            to_output(&thread)
        }
    }
}
