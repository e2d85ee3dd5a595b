//! Auto-replies for incoming WhatsApp messages.
//!
//! Message bodies are matched against a table of exact, case-sensitive
//! triggers. Anything not in the table is ignored.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use crate::whatsapp::{Chat, IncomingMessage, WhatsAppClient, WhatsAppError};

/// Reply to `!ping`.
pub const PONG: &str = "pong";

/// Reply to `good morning`.
pub const GREETING: &str = "selamat pagi";

/// Reply to `!groups` when the account is in no group.
pub const NO_GROUPS: &str = "You have no group yet.";

/// A handler bound to one trigger string.
#[async_trait]
pub trait Command: Send + Sync {
    /// Handle `message`, replying through `client` as needed.
    async fn run(
        &self,
        client: &dyn WhatsAppClient,
        message: &IncomingMessage,
    ) -> Result<(), WhatsAppError>;
}

/// Replies with fixed text.
#[derive(Debug, Clone)]
pub struct Reply(pub &'static str);

#[async_trait]
impl Command for Reply {
    async fn run(
        &self,
        client: &dyn WhatsAppClient,
        message: &IncomingMessage,
    ) -> Result<(), WhatsAppError> {
        client.reply(message, self.0).await
    }
}

/// Replies with the ids and names of every group the account is in.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListGroups;

#[async_trait]
impl Command for ListGroups {
    async fn run(
        &self,
        client: &dyn WhatsAppClient,
        message: &IncomingMessage,
    ) -> Result<(), WhatsAppError> {
        let chats = client.get_chats().await?;
        client.reply(message, &format_group_list(&chats)).await
    }
}

/// Render the `!groups` reply for a chat list. Non-group chats are skipped.
pub fn format_group_list(chats: &[Chat]) -> String {
    let groups: Vec<&Chat> = chats.iter().filter(|chat| chat.is_group).collect();
    if groups.is_empty() {
        return NO_GROUPS.to_owned();
    }

    let mut reply = String::from("*YOUR GROUPS*\n\n");
    for group in groups {
        reply.push_str(&format!("ID: {}\nName: {}\n\n", group.id, group.name));
    }
    reply.push_str("_You can use the group id to send a message to the group._");
    reply
}

/// Trigger → handler lookup table.
#[derive(Default)]
pub struct CommandTable {
    commands: HashMap<String, Box<dyn Command>>,
}

impl CommandTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock commands: `!ping`, `good morning` and `!groups`.
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.register("!ping", Reply(PONG));
        table.register("good morning", Reply(GREETING));
        table.register("!groups", ListGroups);
        table
    }

    /// Bind `trigger` to `command`, replacing any previous binding.
    pub fn register(&mut self, trigger: impl Into<String>, command: impl Command + 'static) {
        self.commands.insert(trigger.into(), Box::new(command));
    }

    /// Whether a body would trigger a command.
    pub fn matches(&self, body: &str) -> bool {
        self.commands.contains_key(body)
    }

    /// Run the command bound to the message body, if any.
    ///
    /// Returns `Ok(false)` when nothing matched.
    ///
    /// # Errors
    ///
    /// Propagates the client error from the command; nothing is retried and
    /// nothing is sent back to the sender.
    pub async fn dispatch(
        &self,
        client: &dyn WhatsAppClient,
        message: &IncomingMessage,
    ) -> Result<bool, WhatsAppError> {
        let Some(command) = self.commands.get(&message.body) else {
            return Ok(false);
        };
        debug!(from = %message.from, trigger = %message.body, "running command");
        command.run(client, message).await?;
        Ok(true)
    }
}

impl std::fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut triggers: Vec<&String> = self.commands.keys().collect();
        triggers.sort();
        f.debug_struct("CommandTable")
            .field("triggers", &triggers)
            .finish()
    }
}
