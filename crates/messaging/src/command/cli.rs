//! CLI text commands.

use async_trait::async_trait;
use clap::error::ErrorKind;
use clap::{ArgMatches, Command};
use marketbus_core::{Reply, Response};

use crate::command::NO_RESPONSE;
use crate::command::dispatcher::CommandContext;

/// A component's clap command tree and its execution
#[async_trait]
pub trait CliHandler: Send + Sync {
    /// Fresh command tree, built per request
    fn command(&self) -> Command;

    /// Run the parsed command, writing the reply into `output`
    async fn execute(&self, ctx: &CommandContext, matches: &ArgMatches, output: &mut CommandOutput);
}

/// Captured output and error streams of one CLI command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub out: String,
    pub err: String,
}

impl CommandOutput {
    pub fn println(&mut self, line: impl AsRef<str>) {
        self.out.push_str(line.as_ref());
        self.out.push('\n');
    }

    pub fn eprintln(&mut self, line: impl AsRef<str>) {
        self.err.push_str(line.as_ref());
        self.err.push('\n');
    }

    /// Reply text: raw output on success, a failure response otherwise
    pub fn into_reply(self) -> String {
        if !self.err.is_empty() {
            return Response::failure(format!("{}\n{}", self.err, self.out)).respond();
        }
        if self.out.is_empty() {
            return Response::failure(NO_RESPONSE).respond();
        }
        self.out
    }
}

/// Split on whitespace, keeping double-quoted segments together as one argument
pub fn split_args(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    let mut has_token = false;

    for ch in input.chars() {
        match ch {
            '"' => {
                in_quote = !in_quote;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quote => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        args.push(current);
    }
    args
}

/// Parse `input` against the handler's tree and execute it
pub(crate) async fn run_cli(handler: &dyn CliHandler, ctx: &CommandContext, input: &str) -> String {
    let command = handler.command();
    let name = command.get_name().to_string();
    let args = std::iter::once(name).chain(split_args(input));

    let mut output = CommandOutput::default();
    match command.try_get_matches_from(args) {
        Ok(matches) => {
            tokio::select! {
                biased;
                _ = handler.execute(ctx, &matches, &mut output) => {}
                _ = ctx.token().cancelled() => {}
            }
        }
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp
            | ErrorKind::DisplayVersion
            | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                output.out.push_str(&e.render().to_string());
            }
            _ => output.err.push_str(&e.render().to_string()),
        },
    }
    output.into_reply()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain_words() {
        assert_eq!(split_args("  data --symbol AAPL "), vec!["data", "--symbol", "AAPL"]);
    }

    #[test]
    fn test_split_keeps_quoted_segments() {
        assert_eq!(
            split_args(r#"note --text "hello big world" --tag x"#),
            vec!["note", "--text", "hello big world", "--tag", "x"]
        );
        assert_eq!(split_args(r#"a "single""#), vec!["a", "single"]);
        assert_eq!(split_args(r#"a """#), vec!["a", ""]);
    }

    #[test]
    fn test_split_unterminated_quote_runs_to_end() {
        assert_eq!(split_args(r#"a "b c"#), vec!["a", "b c"]);
    }

    #[test]
    fn test_reply_rules() {
        let ok = CommandOutput {
            out: "done\n".into(),
            err: String::new(),
        };
        assert_eq!(ok.into_reply(), "done\n");

        let empty: Response = serde_json::from_str(&CommandOutput::default().into_reply()).unwrap();
        assert_eq!(empty.err, NO_RESPONSE);

        let failed = CommandOutput {
            out: "partial".into(),
            err: "bad flag".into(),
        };
        let failed: Response = serde_json::from_str(&failed.into_reply()).unwrap();
        assert_eq!(failed.err, "bad flag\npartial");
    }
}
