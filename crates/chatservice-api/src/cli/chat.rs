//! Chat CLI commands: ask, show, end.

use std::io::Write;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use chatservice_types::chat::{Chat, ChatMessage, ChatStatus, MessageRole};
use chatservice_types::completion::{ChatCompletionInput, ChatCompletionOutput};

use crate::cli::AskArgs;
use crate::state::AppState;

/// Longest message preview shown in the `show` table.
const PREVIEW_CHARS: usize = 60;

/// Send one message, print the answer.
///
/// Ctrl+C cancels the exchange; nothing is persisted in that case.
///
/// # Examples
///
/// ```bash
/// chatsvc ask "What is a context window?"
/// chatsvc ask --chat 0190... --stream "Shorter please"
/// ```
pub async fn ask(state: &AppState, args: AskArgs, json: bool) -> Result<()> {
    let mut config = state.config.completion.clone();
    if let Some(model) = args.model {
        config.model = model;
    }
    let input = ChatCompletionInput {
        chat_id: args.chat,
        user_id: args.user,
        user_message: args.message,
        config,
    };

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let streamed = args.stream && !json;
    let result = if streamed {
        let (tx, mut rx) = mpsc::channel::<ChatCompletionOutput>(32);
        let printer = async move {
            let mut stdout = std::io::stdout();
            while let Some(fragment) = rx.recv().await {
                print!("{}", fragment.content);
                let _ = stdout.flush();
            }
        };
        let (result, ()) = tokio::join!(
            state.completion_service.execute_stream(input, tx, &cancel),
            printer
        );
        println!();
        result
    } else {
        state.completion_service.execute(input, &cancel).await
    };
    interrupt.abort();

    let output = result.context("Chat completion failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if !streamed {
        println!("{}", output.content);
    }
    println!();
    println!(
        "  {} chat {}  (continue with: {})",
        style("i").blue().bold(),
        style(&output.chat_id).cyan(),
        style(format!("chatsvc ask --chat {} \"...\"", output.chat_id)).yellow()
    );

    Ok(())
}

/// Show a chat's window, erased history and token usage.
pub async fn show(state: &AppState, chat_id: &str, json: bool) -> Result<()> {
    let chat = state
        .completion_service
        .find_chat(chat_id)
        .await
        .with_context(|| format!("Chat '{chat_id}' not found"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&chat)?);
        return Ok(());
    }

    print_chat(&chat);
    Ok(())
}

/// End a chat. Ending an ended chat is a no-op.
pub async fn end(state: &AppState, chat_id: &str, json: bool) -> Result<()> {
    let chat = state
        .completion_service
        .end_chat(chat_id)
        .await
        .with_context(|| format!("Failed to end chat '{chat_id}'"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&chat)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Chat {} ended",
        style("✓").green().bold(),
        style(chat.id()).cyan()
    );
    println!();
    Ok(())
}

fn print_chat(chat: &Chat) {
    let status = match chat.status() {
        ChatStatus::Active => style("active").green(),
        ChatStatus::Ended => style("ended").dim(),
    };

    println!();
    println!(
        "  Chat {} ({}) for user {}",
        style(chat.id()).cyan().bold(),
        status,
        style(chat.user_id()).cyan()
    );
    println!(
        "  Model {}  window {}/{} tokens  version {}",
        style(chat.model().name()).bold(),
        style(chat.token_usage()).bold(),
        chat.model().max_tokens(),
        chat.version()
    );
    println!();

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("#").fg(Color::White),
        Cell::new("Role").fg(Color::White),
        Cell::new("Tokens").fg(Color::White),
        Cell::new("Created").fg(Color::White),
        Cell::new("Content").fg(Color::White),
    ]);

    for (i, message) in chat.erased_messages().iter().enumerate() {
        table.add_row(message_row(&format!("e{}", i + 1), message, true));
    }
    for (i, message) in chat.active_messages().iter().enumerate() {
        table.add_row(message_row(&(i + 1).to_string(), message, false));
    }

    println!("{table}");
    println!();
    println!(
        "  {} active, {} erased",
        style(chat.active_messages().len()).bold(),
        style(chat.erased_messages().len()).bold()
    );
    println!();
}

fn message_row(index: &str, message: &ChatMessage, erased: bool) -> Vec<Cell> {
    let role_color = match message.role() {
        MessageRole::System => Color::Yellow,
        MessageRole::User => Color::Cyan,
        MessageRole::Assistant => Color::Green,
    };
    let text_color = if erased { Color::DarkGrey } else { Color::White };

    vec![
        Cell::new(index).fg(Color::DarkGrey),
        Cell::new(message.role().to_string()).fg(if erased { Color::DarkGrey } else { role_color }),
        Cell::new(message.token_count().to_string()).fg(text_color),
        Cell::new(message.created_at().format("%Y-%m-%d %H:%M").to_string()).fg(Color::DarkGrey),
        Cell::new(preview(message.content())).fg(text_color),
    ]
}

/// Single-line preview, truncated on a char boundary.
fn preview(content: &str) -> String {
    let flat = content.replace('\n', " ");
    if flat.chars().count() > PREVIEW_CHARS {
        let cut: String = flat.chars().take(PREVIEW_CHARS - 3).collect();
        format!("{cut}...")
    } else {
        flat
    }
}
