//! Interactive chat session.
//!
//! A [`ChatSession`] keeps the conversation history for one process run and
//! issues one completion request per input line, each carrying the whole
//! history so far.

use std::io::{self, BufRead, Write};

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::chat::config::{ChatConfig, ChatOptions};
use crate::client::ChatCompletion;
use crate::error::{Error, Result};
use crate::observability::CHAT_TURNS;
use crate::types::{ChatCompletionRequest, ChatMessage, Model};

/// Prompt shown before each line read from a terminal.
pub const USER_PROMPT: &str = "user: ";

/// A source of input lines for the interactive loop.
pub trait LineSource {
    /// The next line without its line terminator, or `None` at end of input.
    fn next_line(&mut self) -> Result<Option<String>>;
}

/// Lines read from any buffered reader, such as piped standard input.
#[derive(Debug)]
pub struct ReaderLines<R> {
    reader: R,
}

impl<R: BufRead> ReaderLines<R> {
    /// Read lines from `reader`.
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> LineSource for ReaderLines<R> {
    fn next_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .map_err(|e| Error::io(format!("cannot read input: {e}"), e))?;
        if read == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }
}

/// Lines read from a terminal with line editing and history.
///
/// Ctrl-C and Ctrl-D both end the input.
pub struct EditorLines {
    editor: DefaultEditor,
}

impl EditorLines {
    /// Create a line editor on the controlling terminal.
    pub fn new() -> Result<Self> {
        let editor = DefaultEditor::new().map_err(readline_error)?;
        Ok(Self { editor })
    }
}

impl LineSource for EditorLines {
    fn next_line(&mut self) -> Result<Option<String>> {
        match self.editor.readline(USER_PROMPT) {
            Ok(line) => {
                let _ = self.editor.add_history_entry(line.as_str());
                Ok(Some(line))
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
            Err(err) => Err(readline_error(err)),
        }
    }
}

fn readline_error(err: ReadlineError) -> Error {
    match err {
        ReadlineError::Io(e) => Error::io(format!("terminal input failed: {e}"), e),
        other => Error::io(
            format!("terminal input failed: {other}"),
            io::Error::other(other.to_string()),
        ),
    }
}

/// A chat session that manages conversation state and API interactions.
pub struct ChatSession<C: ChatCompletion> {
    client: C,
    model: Model,
    options: ChatOptions,
    messages: Vec<ChatMessage>,
}

impl<C: ChatCompletion> ChatSession<C> {
    /// Creates a new chat session with the given client and configuration.
    pub fn new(client: C, config: &ChatConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            options: config.options,
            messages: Vec::new(),
        }
    }

    /// The completion client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// The conversation so far.
    pub fn history(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Sends one user message with the full history and records the reply.
    ///
    /// On failure the history is left as it was before the call.
    ///
    /// # Errors
    ///
    /// Returns a service error if the request fails and
    /// [`Error::NoChoices`] if the service returned no candidates.
    pub async fn send(&mut self, user_input: &str) -> Result<String> {
        let previous_len = self.messages.len();
        self.messages.push(ChatMessage::user(user_input));
        let request = ChatCompletionRequest::new(
            self.model.clone(),
            self.messages.clone(),
            self.options.temperature,
            self.options.max_tokens,
        );
        tracing::debug!(messages = ?request.messages, "sending chat turn");

        let reply = match self.client.create_chat_completion(request).await {
            Ok(response) => response.first_content().map(str::to_string),
            Err(err) => Err(err),
        };
        match reply {
            Ok(content) => {
                self.messages.push(ChatMessage::assistant(content.clone()));
                CHAT_TURNS.click();
                Ok(content)
            }
            Err(err) => {
                self.messages.truncate(previous_len);
                Err(err)
            }
        }
    }

    /// Runs the interactive loop until an empty line or end of input.
    ///
    /// Every line is trimmed before it is sent, and each reply is written to
    /// `out` as `assistant: <content>`.  Returns the number of completed
    /// turns.
    ///
    /// # Errors
    ///
    /// The first input, service or output failure ends the session.
    pub async fn run<L, W>(&mut self, input: &mut L, out: &mut W) -> Result<usize>
    where
        L: LineSource + ?Sized,
        W: Write + ?Sized,
    {
        let mut turns = 0;
        while let Some(line) = input.next_line()? {
            let line = line.trim();
            if line.is_empty() {
                tracing::debug!("empty input, exiting");
                break;
            }
            let reply = self.send(line).await?;
            writeln!(out, "assistant: {reply}")?;
            out.flush()?;
            turns += 1;
        }
        Ok(turns)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::Cursor;
    use std::sync::Mutex;

    use super::*;
    use crate::types::{ChatCompletionResponse, Role};

    #[derive(Default)]
    struct ScriptedClient {
        replies: Mutex<VecDeque<Result<ChatCompletionResponse>>>,
        requests: Mutex<Vec<ChatCompletionRequest>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<Result<ChatCompletionResponse>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<ChatCompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl ChatCompletion for ScriptedClient {
        async fn create_chat_completion(
            &self,
            request: ChatCompletionRequest,
        ) -> Result<ChatCompletionResponse> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::connection("no scripted reply", None)))
        }
    }

    fn lines(text: &str) -> ReaderLines<Cursor<Vec<u8>>> {
        ReaderLines::new(Cursor::new(text.as_bytes().to_vec()))
    }

    #[test]
    fn reader_lines_strip_terminators() {
        let mut input = lines("one\r\ntwo\n\nthree");
        assert_eq!(input.next_line().unwrap().as_deref(), Some("one"));
        assert_eq!(input.next_line().unwrap().as_deref(), Some("two"));
        assert_eq!(input.next_line().unwrap().as_deref(), Some(""));
        assert_eq!(input.next_line().unwrap().as_deref(), Some("three"));
        assert_eq!(input.next_line().unwrap(), None);
    }

    #[tokio::test]
    async fn hello_then_empty_line() {
        let client = ScriptedClient::new(vec![Ok(ChatCompletionResponse::with_contents(["hi there"]))]);
        let mut session = ChatSession::new(client, &ChatConfig::new());
        let mut out = Vec::new();

        let turns = session.run(&mut lines("hello\n\n"), &mut out).await.unwrap();
        assert_eq!(turns, 1);
        assert_eq!(String::from_utf8(out).unwrap(), "assistant: hi there\n");

        let requests = session.client().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages, vec![ChatMessage::user("hello")]);
        assert_eq!(requests[0].temperature, 0.5);
        assert_eq!(requests[0].max_tokens, 500);
        assert_eq!(
            session.history(),
            &[ChatMessage::user("hello"), ChatMessage::assistant("hi there")]
        );
    }

    #[tokio::test]
    async fn history_grows_each_turn() {
        let client = ScriptedClient::new(vec![
            Ok(ChatCompletionResponse::with_contents(["first"])),
            Ok(ChatCompletionResponse::with_contents(["second", "ignored"])),
        ]);
        let mut session = ChatSession::new(client, &ChatConfig::new());
        let mut out = Vec::new();

        let turns = session
            .run(&mut lines("  one  \ntwo"), &mut out)
            .await
            .unwrap();
        assert_eq!(turns, 2);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "assistant: first\nassistant: second\n"
        );

        let requests = session.client().requests();
        assert_eq!(requests[0].messages, vec![ChatMessage::user("one")]);
        let roles: Vec<Role> = requests[1].messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
        assert_eq!(session.history().len(), 4);
    }

    #[tokio::test]
    async fn end_of_input_without_lines() {
        let client = ScriptedClient::default();
        let mut session = ChatSession::new(client, &ChatConfig::new());
        let mut out = Vec::new();
        assert_eq!(session.run(&mut lines(""), &mut out).await.unwrap(), 0);
        assert!(out.is_empty());
        assert!(session.client().requests().is_empty());
    }

    #[tokio::test]
    async fn no_choices_ends_session() {
        let client = ScriptedClient::new(vec![Ok(ChatCompletionResponse::default())]);
        let mut session = ChatSession::new(client, &ChatConfig::new());
        let mut out = Vec::new();

        let err = session
            .run(&mut lines("hello\nagain\n"), &mut out)
            .await
            .unwrap_err();
        assert!(err.is_no_choices());
        assert!(out.is_empty());
        assert_eq!(session.client().requests().len(), 1);
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn service_failure_ends_session() {
        let client = ScriptedClient::new(vec![
            Ok(ChatCompletionResponse::with_contents(["ok"])),
            Err(Error::rate_limit("slow down", None)),
        ]);
        let mut session = ChatSession::new(client, &ChatConfig::new());
        let mut out = Vec::new();

        let err = session
            .run(&mut lines("a\nb\nc\n"), &mut out)
            .await
            .unwrap_err();
        assert!(err.is_rate_limit());
        assert_eq!(String::from_utf8(out).unwrap(), "assistant: ok\n");
        assert_eq!(session.client().requests().len(), 2);
        assert_eq!(session.history().len(), 2);
    }
}
