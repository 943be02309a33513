//! Command-line chat client for the OpenAI chat completions API.
//!
//! # Usage
//!
//! ```bash
//! # Interactive chat; an empty line or Ctrl-D exits
//! aichat
//!
//! # Run a prompt template over standard input
//! echo "bonjour" | aichat translate
//!
//! # List templates found in ~/.aichat/prompts
//! aichat -l
//! ```
//!
//! The API key comes from `OPENAI_API_KEY` or from `openai_api_key` in
//! `~/.aichat/config.yaml`.  Set `AICHAT_HOME` to use another directory.

use std::io::{self, IsTerminal, Read};
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use aichat::chat::{
    ChatArgs, ChatConfig, ChatSession, EditorLines, LineSource, ReaderLines, list_prompts,
    run_template, usage,
};
use aichat::{AppConfig, BpeTokenizer, OpenAi, Result};

const PROGRAM: &str = "aichat";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = match ChatArgs::parse(std::env::args_os().skip(1)) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{err}\n\n{}", usage(PROGRAM));
            return ExitCode::FAILURE;
        }
    };
    if args.help {
        println!("{}", usage(PROGRAM));
        return ExitCode::SUCCESS;
    }

    let directives = log_directives(args.verbose);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives)))
        .with_writer(io::stderr)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

/// Default filter when `RUST_LOG` is unset.  Verbose output covers this
/// crate only; dependencies stay at warn.
fn log_directives(verbose: bool) -> &'static str {
    if verbose { "warn,aichat=debug" } else { "warn" }
}

async fn run(args: ChatArgs) -> Result<()> {
    let app = AppConfig::from_env()?;
    if args.list_prompts {
        let library = app.load_prompts()?;
        return list_prompts(&library, &mut io::stdout().lock());
    }

    let config = ChatConfig::from(&args);
    tracing::debug!(
        model = %config.model,
        temperature = config.options.temperature,
        max_tokens = config.options.max_tokens,
        context_window = config.context_window,
        timeout_secs = config.timeout.as_secs(),
        max_retries = config.max_retries,
        split = config.split,
        "resolved options"
    );

    let client = OpenAi::with_options(
        Some(app.api_key()?),
        config.base_url.clone(),
        Some(config.timeout),
    )?
    .with_max_retries(config.max_retries);

    match args.template.as_deref() {
        None => {
            let mut input: Box<dyn LineSource> = if io::stdin().is_terminal() {
                Box::new(EditorLines::new()?)
            } else {
                Box::new(ReaderLines::new(io::stdin().lock()))
            };
            let mut session = ChatSession::new(client, &config);
            let turns = session.run(input.as_mut(), &mut io::stdout()).await?;
            tracing::debug!(turns, "chat finished");
        }
        Some(name) => {
            let library = app.load_prompts()?;
            let template = library.get(name)?;
            let mut input = String::new();
            io::stdin()
                .read_to_string(&mut input)
                .map_err(|e| aichat::Error::io(format!("cannot read standard input: {e}"), e))?;
            let tokenizer = BpeTokenizer::for_model(&config.model)?;
            let requests = run_template(
                &client,
                &tokenizer,
                template,
                &input,
                &config,
                &mut io::stdout().lock(),
            )
            .await?;
            tracing::debug!(requests, "template finished");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_filter_is_scoped_to_aichat() {
        assert_eq!(log_directives(false), "warn");
        assert_eq!(log_directives(true), "warn,aichat=debug");
        let filter = EnvFilter::new(log_directives(true)).to_string();
        assert!(filter.contains("aichat=debug"));
        assert!(!filter.contains("reqwest"));
    }
}
