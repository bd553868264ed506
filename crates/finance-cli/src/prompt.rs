use anyhow::Result;
use finance::models::message::Message;

pub mod rustyline;

pub trait Prompt {
    fn render(&mut self, message: Box<Message>);
    fn get_input(&mut self) -> Result<Input>;
    fn show_busy(&mut self);
    fn hide_busy(&self);
    fn close(&self);
    fn ready(&self) {
        println!();
        println!("Finance assistant is ready. Ask about stocks or crypto, or type /help.");
        println!();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Input {
    pub input_type: InputType,
    pub content: Option<String>, // Optional content as sometimes the user may be issuing a command eg. (Exit)
}

impl Input {
    pub fn message<S: Into<String>>(content: S) -> Self {
        Self {
            input_type: InputType::Message,
            content: Some(content.into()),
        }
    }

    pub fn command(input_type: InputType) -> Self {
        Self {
            input_type,
            content: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    AskAgain,  // Ask the user for input again. Control flow command.
    Message,   // User sent a message
    Reconnect, // Run the connection retry loop again
    ListTools, // Show the tools currently on offer
    Exit,      // User wants to exit the session
}

pub enum Theme {
    Light,
    Dark,
}
