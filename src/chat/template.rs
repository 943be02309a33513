//! Templated single-shot mode and template listing.

use std::io::Write;

use crate::chat::config::ChatConfig;
use crate::client::ChatCompletion;
use crate::error::Result;
use crate::observability::TEMPLATE_SEGMENTS;
use crate::prompt::{PromptLibrary, PromptTemplate};
use crate::tokenizer::Tokenizer;
use crate::types::{ChatCompletionRequest, ChatMessage, Usage};

/// Build the message lists for one templated invocation.
///
/// With splitting disabled, or when `input` fits the budget left after the
/// template and `max_tokens` are taken out of `context_window`, the result is
/// a single expansion.  Oversized input yields one expansion per segment.
/// Empty input always yields one expansion with the marker removed.
///
/// # Errors
///
/// Returns [`Error::Budget`](crate::Error::Budget) when splitting is enabled,
/// the input is not empty and the template leaves no room for it.
pub fn plan_requests(
    template: &PromptTemplate,
    tokenizer: &dyn Tokenizer,
    input: &str,
    context_window: usize,
    max_tokens: u32,
    split: bool,
) -> Result<Vec<Vec<ChatMessage>>> {
    if !split || input.is_empty() {
        return Ok(vec![template.expand(input)]);
    }
    let allowed = template.allowed_input_tokens_reserving(tokenizer, context_window, max_tokens)?;
    let input_tokens = tokenizer.count(input)?;
    tracing::debug!(allowed, input_tokens, "templated input budget");
    if input_tokens <= allowed {
        return Ok(vec![template.expand(input)]);
    }
    template.expand_with_split_reserving(tokenizer, input, context_window, max_tokens)
}

/// Run `template` over `input`, issuing one request per planned message list.
///
/// The first choice of every response is written to `out`, one per line, but
/// only once every request has succeeded.  Returns the number of requests
/// issued.
///
/// # Errors
///
/// Fails on the first budget, service or no-choices error; nothing is
/// written in that case.
pub async fn run_template<C, W>(
    client: &C,
    tokenizer: &dyn Tokenizer,
    template: &PromptTemplate,
    input: &str,
    config: &ChatConfig,
    out: &mut W,
) -> Result<usize>
where
    C: ChatCompletion + ?Sized,
    W: Write + ?Sized,
{
    let options = config.options.resolve(template);
    tracing::debug!(
        model = %config.model,
        temperature = options.temperature,
        max_tokens = options.max_tokens,
        "resolved template options"
    );
    let batches = plan_requests(
        template,
        tokenizer,
        input,
        config.context_window,
        options.max_tokens,
        config.split,
    )?;

    let mut replies = Vec::with_capacity(batches.len());
    let mut usage = Usage::default();
    for (index, messages) in batches.into_iter().enumerate() {
        tracing::debug!(segment = index, ?messages, "sending templated request");
        let request = ChatCompletionRequest::new(
            config.model.clone(),
            messages,
            options.temperature,
            options.max_tokens,
        );
        let response = client.create_chat_completion(request).await?;
        replies.push(response.first_content()?.to_string());
        if let Some(segment_usage) = response.usage {
            usage = usage + segment_usage;
        }
        TEMPLATE_SEGMENTS.click();
    }
    tracing::debug!(
        requests = replies.len(),
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        total_tokens = usage.total_tokens,
        "templated run usage"
    );
    for reply in &replies {
        writeln!(out, "{reply}")?;
    }
    out.flush()?;
    Ok(replies.len())
}

/// Write one `name<TAB>description` line per template.
pub fn list_prompts<W: Write + ?Sized>(library: &PromptLibrary, out: &mut W) -> Result<()> {
    for (name, template) in library.iter() {
        writeln!(out, "{name}\t{}", template.description)?;
    }
    out.flush()?;
    Ok(())
}
