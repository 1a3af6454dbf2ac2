//! Interactive console: reads lines, sends them and prints the acknowledgments.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::client::SecureWsClient;

/// Shown before each line is read
pub const PROMPT: &str = "Enter text: ";

/// Lines that end the session, compared after trimming
pub const QUIT_TOKENS: [&str; 4] = ["bye", "exit", "q", "quit"];

/// What a line of input asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input<'a> {
    Quit,
    Empty,
    Send(&'a str),
}

/// Classifies a raw input line. Surrounding whitespace and the line terminator
/// are not part of the message.
pub fn parse_input(line: &str) -> Input<'_> {
    let text = line.trim();
    if text.is_empty() {
        Input::Empty
    } else if QUIT_TOKENS.contains(&text) {
        Input::Quit
    } else {
        Input::Send(text)
    }
}

/// Why the console stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// A quit token was entered
    Quit,
    /// Input was exhausted
    EndOfInput,
}

/// Runs the prompt loop until the user quits or input ends, then closes the
/// session.
///
/// Failed exchanges are reported and the loop keeps prompting; once the
/// session is gone every further line reports it as closed.
pub async fn run_console<R, W>(client: &mut SecureWsClient, input: R, mut output: W) -> ExitReason
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();

    let reason = loop {
        show(&mut output, format_args!("{PROMPT}"));

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break ExitReason::EndOfInput,
            Err(e) => {
                tracing::error!("Input: {}", e);
                continue;
            }
        };

        let text = match parse_input(&line) {
            Input::Quit => break ExitReason::Quit,
            Input::Empty => continue,
            Input::Send(text) => text,
        };

        match client.send_request(text).await {
            Ok(ack) => {
                tracing::debug!("Recv: {}", ack);
                show(&mut output, format_args!("Recv: {ack}\n"));
            }
            Err(e) => tracing::error!("{}", e),
        }
    };

    if let Err(e) = client.disconnect().await {
        tracing::error!("{}", e);
    }
    reason
}

fn show(output: &mut impl Write, args: std::fmt::Arguments<'_>) {
    if let Err(e) = output.write_fmt(args).and_then(|()| output.flush()) {
        tracing::warn!("Console output failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quit_tokens() {
        for token in ["bye", "exit", "q", "quit", "  quit  ", "q\r", "\tbye"] {
            assert_eq!(parse_input(token), Input::Quit, "{token:?}");
        }
    }

    #[test]
    fn test_quit_tokens_are_case_sensitive() {
        assert_eq!(parse_input("QUIT"), Input::Send("QUIT"));
        assert_eq!(parse_input("quit now"), Input::Send("quit now"));
    }

    #[test]
    fn test_empty_lines() {
        assert_eq!(parse_input(""), Input::Empty);
        assert_eq!(parse_input("   \r"), Input::Empty);
    }

    #[test]
    fn test_text_is_trimmed() {
        assert_eq!(parse_input("  hello world \r"), Input::Send("hello world"));
    }
}
