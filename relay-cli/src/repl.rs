//! Line-oriented REPL mode.
//!
//! Each input line is one user turn in the same session; the reply is
//! streamed to stdout in the wire format. Ctrl-C cancels the running turn,
//! `/quit` or end of input leaves.

use anyhow::{Context, Result};
use relay_core::{ChatService, TurnInput};
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use crate::{TurnStatus, run_turn};

/// Commands that end the REPL.
const QUIT_COMMANDS: &[&str] = &["/quit", "/exit"];

/// What to do with one line of input.
#[derive(Debug, PartialEq, Eq)]
enum LineAction<'a> {
    Skip,
    Quit,
    Send(&'a str),
}

fn classify(line: &str) -> LineAction<'_> {
    let line = line.trim();
    if line.is_empty() {
        LineAction::Skip
    } else if QUIT_COMMANDS.contains(&line) {
        LineAction::Quit
    } else {
        LineAction::Send(line)
    }
}

/// Run turns for every line read from stdin.
pub async fn run_repl(
    service: &ChatService,
    session_id: Uuid,
    user_id: Uuid,
    show_headers: bool,
) -> Result<()> {
    eprintln!("Session {}. Type /quit to exit.", session_id);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let content = match classify(&line) {
            LineAction::Skip => continue,
            LineAction::Quit => break,
            LineAction::Send(content) => content,
        };

        let input = TurnInput {
            session_id,
            user_id,
            content: content.to_string(),
        };
        // A failed turn should not end the session.
        match run_turn(service, input, show_headers).await {
            Ok(TurnStatus::Completed) => {}
            Ok(TurnStatus::Interrupted) => eprintln!("[Interrupted]"),
            Err(e) => eprintln!("Error: {:#}", e),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_blank_line() {
        assert_eq!(classify("   "), LineAction::Skip);
    }

    #[test]
    fn test_classify_quit_commands() {
        assert_eq!(classify("/quit"), LineAction::Quit);
        assert_eq!(classify(" /exit "), LineAction::Quit);
    }

    #[test]
    fn test_classify_message_is_trimmed() {
        assert_eq!(classify("  hello there \n"), LineAction::Send("hello there"));
    }
}
