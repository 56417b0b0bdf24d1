use serde::Serialize;

pub const LOG_OUTPUT_FALLBACK: &str = "Log Output";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { text: TextObject },
}

/// A chat message: `fallback_text` is Slack's `text`, `blocks` is optional rich layout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

impl MessageTemplate {
    pub fn text(text: impl Into<String>) -> Self {
        Self { fallback_text: text.into(), blocks: Vec::new() }
    }
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { text: builder.build() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::mrkdwn(""))
    }
}

pub fn environment_list_message(names: &[&str]) -> MessageTemplate {
    MessageTemplate::text(format!("Configured environments: {}", names.join(",")))
}

pub fn deployment_started_message(env_name: &str) -> MessageTemplate {
    MessageTemplate::text(format!("Starting deployment for: {env_name}"))
}

pub fn deployment_result_message(success: bool) -> MessageTemplate {
    MessageTemplate::text(if success { "Deployment done" } else { "Deployment failed" })
}

/// Wraps an already-truncated log excerpt in a code block.
pub fn log_output_message(log_tail: &str) -> MessageTemplate {
    MessageBuilder::new(LOG_OUTPUT_FALLBACK)
        .section(|section| {
            section.mrkdwn(format!("```{log_tail}```"));
        })
        .build()
}
