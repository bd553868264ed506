use std::io::{self, Write};

use anyhow::Result;
use bat::WrappingMode;
use cliclack::spinner;
use console::style;
use finance::models::message::{Message, MessageContent, ToolRequest, ToolResponse};
use finance::models::tool::ToolCall;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde_json::Value;

use super::{Input, InputType, Prompt, Theme};

const PROMPT: &str = "\x1b[1m\x1b[38;5;30m($)> \x1b[0m";
const MAX_STRING_LENGTH: usize = 40;
const INDENT: &str = "    ";

pub struct RustylinePrompt {
    editor: DefaultEditor,
    spinner: cliclack::ProgressBar,
    theme: Theme,
}

impl RustylinePrompt {
    pub fn new() -> Result<Self> {
        Ok(RustylinePrompt {
            editor: DefaultEditor::new()?,
            spinner: spinner(),
            theme: Theme::Dark,
        })
    }

    fn theme_name(&self) -> &'static str {
        match self.theme {
            Theme::Light => "GitHub",
            Theme::Dark => "zenburn",
        }
    }
}

/// Map a line of user input to what the session should do with it
pub fn parse_input(line: &str) -> Input {
    let text = line.trim();
    let command = text.to_ascii_lowercase();

    match command.as_str() {
        "" => Input::command(InputType::AskAgain),
        "/exit" | "/quit" | "exit" | "quit" | "q" => Input::command(InputType::Exit),
        "/reconnect" => Input::command(InputType::Reconnect),
        "/tools" => Input::command(InputType::ListTools),
        _ => Input::message(text),
    }
}

fn print_help() {
    println!("Commands:");
    println!("/exit | /quit - Exit the session (plain exit, quit and q work too)");
    println!("/reconnect - Try to connect to the MCP server again");
    println!("/tools - List the tools currently available");
    println!("/t - Toggle Light/Dark theme");
    println!("/? | /help - Display this help message");
    println!("Ctrl+C - Interrupt a reply (resets the interaction to before the interrupted request)");
}

fn render_request(tool_request: &ToolRequest, theme: &str) {
    match &tool_request.tool_call {
        Ok(call) => {
            print_request_header(call);

            // Format and print the parameters
            print_params(&call.arguments, 0);
            print_newline();
        }
        Err(e) => print_markdown(&e.to_string(), theme),
    }
}

fn render_response(tool_response: &ToolResponse, theme: &str) {
    match &tool_response.tool_result {
        Ok(_) => print_markdown(&tool_response.as_text(), theme),
        Err(e) => println!("{}", style(e.to_string()).red()),
    }
}

fn print_request_header(call: &ToolCall) {
    let tool_header = format!(
        "─── {} | {} ──────────────────────────",
        style(&call.name),
        style("mcp").magenta().dim(),
    );
    print_newline();
    println!("{}", tool_header);
}

fn print_markdown(content: &str, theme: &str) {
    let printed = bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(content.as_bytes()))
        .theme(theme)
        .language("Markdown")
        .wrapping_mode(WrappingMode::Character)
        .print();
    if printed.is_err() {
        println!("{}", content);
    }
}

/// Format and print parameters recursively with proper indentation and colors
fn print_params(value: &Value, depth: usize) {
    let indent = INDENT.repeat(depth);

    match value {
        Value::Object(map) => {
            for (key, val) in map {
                match val {
                    Value::Object(_) | Value::Array(_) => {
                        println!("{}{}:", indent, style(key).dim());
                        print_params(val, depth + 1);
                    }
                    Value::String(s) => {
                        if s.len() > MAX_STRING_LENGTH {
                            println!("{}{}: {}", indent, style(key).dim(), style("...").dim());
                        } else {
                            println!("{}{}: {}", indent, style(key).dim(), style(s).green());
                        }
                    }
                    other => {
                        println!("{}{}: {}", indent, style(key).dim(), style(other).blue());
                    }
                }
            }
        }
        Value::Array(arr) => {
            for (i, item) in arr.iter().enumerate() {
                println!("{}{}.", indent, i + 1);
                print_params(item, depth + 1);
            }
        }
        Value::String(s) => println!("{}{}", indent, style(s).green()),
        other => println!("{}{}", indent, style(other).yellow()),
    }
}

fn print_newline() {
    println!();
}

impl Prompt for RustylinePrompt {
    fn render(&mut self, message: Box<Message>) {
        let theme = self.theme_name();

        for message_content in &message.content {
            match message_content {
                MessageContent::Text(text) => print_markdown(&text.text, theme),
                MessageContent::ToolRequest(tool_request) => render_request(tool_request, theme),
                MessageContent::ToolResponse(tool_response) => {
                    render_response(tool_response, theme)
                }
            }
        }

        print_newline();
        let _ = io::stdout().flush();
    }

    fn show_busy(&mut self) {
        self.spinner = spinner();
        self.spinner.start("Thinking...");
    }

    fn hide_busy(&self) {
        self.spinner.stop("");
    }

    fn get_input(&mut self) -> Result<Input> {
        let line = match self.editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                return Ok(Input::command(InputType::Exit))
            }
            Err(e) => {
                eprintln!("Input error: {}", e);
                return Ok(Input::command(InputType::Exit));
            }
        };
        if !line.trim().is_empty() {
            let _ = self.editor.add_history_entry(line.trim());
        }

        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case("/t") {
            self.theme = match self.theme {
                Theme::Light => {
                    println!("Switching to Dark theme");
                    Theme::Dark
                }
                Theme::Dark => {
                    println!("Switching to Light theme");
                    Theme::Light
                }
            };
            return Ok(Input::command(InputType::AskAgain));
        }
        if trimmed.eq_ignore_ascii_case("/?") || trimmed.eq_ignore_ascii_case("/help") {
            print_help();
            return Ok(Input::command(InputType::AskAgain));
        }

        Ok(parse_input(trimmed))
    }

    fn close(&self) {
        // No cleanup required
    }
}
