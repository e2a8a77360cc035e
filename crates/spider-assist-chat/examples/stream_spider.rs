use std::sync::Arc;

use spider_assist_chat::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ChatError> {
    let client = CompletionsClient::from_env()?;
    let session = ChatSession::new(Arc::new(client), PromptMode::Plain);

    let mut turn = session
        .submit("Write a spider that collects book titles and prices from books.toscrape.com")
        .await?;

    while let Some(event) = turn.next_event().await {
        match event {
            TurnEvent::Chunk { text, .. } => print!("{text}"),
            TurnEvent::Completed { .. } => println!(),
            TurnEvent::Failed { error, .. } => eprintln!("turn error: {error}"),
        }
    }

    if let Some(code) = turn.finish().await?.artifact {
        println!("\n--- extracted {} ---\n{}", code.language, code.body);
    }
    Ok(())
}
