use anyhow::{bail, Context};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docchat::application::{
    AnswerEvent, AnswerGenerator, AnswerStream, CancelHandle, ChatSession, IndexingService,
};
use docchat::domain::{MessageRole, Provenance};
use docchat::infrastructure::{
    AnswerMode, AppConfig, FileByteStore, FileDocumentLoader, InMemoryIndexBuilder, OpenAiChat,
    OpenAiEmbedding,
};

const USAGE: &str = "usage: docchat [--provenance] <file>...

Loads the given .txt, .md, .docx or .pdf files and answers questions read
from stdin. Ctrl-C stops the answer in progress, or exits at the prompt.
Commands: /history, /quit";

struct Args {
    provenance: bool,
    files: Vec<PathBuf>,
}

impl Args {
    fn parse(args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let mut provenance = false;
        let mut files = Vec::new();
        for arg in args {
            match arg.as_str() {
                "--provenance" => provenance = true,
                "-h" | "--help" => bail!("{USAGE}"),
                flag if flag.starts_with("--") => bail!("unknown option {flag}\n\n{USAGE}"),
                _ => files.push(PathBuf::from(arg)),
            }
        }
        if files.is_empty() {
            bail!("{USAGE}");
        }
        Ok(Self { provenance, files })
    }
}

fn init_tracing() {
    let json = std::env::var("DOCCHAT_LOG_FORMAT").is_ok_and(|f| f == "json");

    // Logs go to stderr so answers on stdout stay clean.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docchat=info".into()),
        )
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

fn build_session(app: &AppConfig) -> anyhow::Result<ChatSession> {
    let config = &app.config;

    let embedding = Arc::new(OpenAiEmbedding::from_config(&config.embedding)?);
    let store = Arc::new(FileByteStore::new(&config.cache.embeddings_dir));
    let indexing = IndexingService::new(
        Arc::new(FileDocumentLoader::new()),
        embedding,
        store,
        Arc::new(InMemoryIndexBuilder),
        config.chunking.splitter()?,
        config.rag.top_k,
    )
    .with_batch_size(config.embedding.batch_size);

    let llm = Arc::new(OpenAiChat::from_config(&config.llm)?);
    info!(model = llm.model(), mode = ?config.rag.answer_mode, "chat model configured");

    Ok(ChatSession::new(
        indexing,
        AnswerGenerator::new(llm),
        app.template().clone(),
    ))
}

fn print_history(session: &ChatSession) {
    for message in session.history() {
        let speaker = match message.role {
            MessageRole::Human => "you",
            MessageRole::Ai => "ai",
        };
        println!("[{speaker}] {}", message.content);
    }
}

/// Forwards every Ctrl-C for the rest of the process. An answer in flight
/// is cancelled; at the prompt the loop exits.
fn interrupts() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

async fn answer(
    session: &mut ChatSession,
    question: &str,
    mode: AnswerMode,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
) -> anyhow::Result<()> {
    let cancel = CancelHandle::new();
    let mut stream = match session.ask_with_cancel(question, cancel.clone()).await {
        Ok(stream) => stream,
        Err(e) if e.is_recoverable() => {
            warn!(error = %e, "question failed");
            eprintln!("{e}");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    pump_events(&mut stream, &cancel, interrupts, |event| render(event, mode)).await
}

/// Feeds answer events to `render` until the stream ends. A pending interrupt
/// cancels the answer before the next event is pulled.
async fn pump_events<F>(
    stream: &mut AnswerStream<'_>,
    cancel: &CancelHandle,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
    mut render: F,
) -> anyhow::Result<()>
where
    F: FnMut(AnswerEvent) -> anyhow::Result<()>,
{
    loop {
        let event = tokio::select! {
            biased;
            Some(()) = interrupts.recv() => {
                cancel.cancel();
                continue;
            }
            event = stream.next() => event,
        };
        match event {
            Some(event) => render(event)?,
            None => return Ok(()),
        }
    }
}

fn render(event: AnswerEvent, mode: AnswerMode) -> anyhow::Result<()> {
    match event {
        AnswerEvent::Token(token) => {
            print!("{token}");
            std::io::stdout().flush()?;
        }
        AnswerEvent::Completed(answer) => {
            println!();
            if mode == AnswerMode::Provenance && answer.provenance != Provenance::Unspecified {
                println!("(source: {})", answer.provenance.as_str());
            }
            let sources = answer.source_names();
            if !sources.is_empty() {
                println!("(from: {})", sources.join(", "));
            }
        }
        AnswerEvent::Failed(e) => {
            println!();
            warn!(error = %e, "answer failed");
            eprintln!("answer failed: {e}");
        }
        AnswerEvent::Cancelled => {
            println!();
            eprintln!("[stopped]");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse(std::env::args().skip(1))?;

    let mut app = AppConfig::load()?;
    if args.provenance {
        app.config.rag.answer_mode = AnswerMode::Provenance;
    }
    let mode = app.config.rag.answer_mode;

    let mut session = build_session(&app)?;
    let knowledge = session
        .load_paths(&args.files)
        .await
        .context("failed to load documents")?;
    info!(
        namespace = knowledge.namespace(),
        documents = knowledge.documents().len(),
        chunks = knowledge.chunk_count(),
        "documents loaded"
    );

    if let Some(greeting) = session.greeting() {
        println!("{greeting}");
    }

    let mut interrupts = interrupts();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = interrupts.recv() => {
                println!();
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        match line.trim() {
            "" => continue,
            "/quit" => break,
            "/history" => print_history(&session),
            question => answer(&mut session, question, mode, &mut interrupts).await?,
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docchat::domain::ports::{LlmProvider, TokenStream};
    use docchat::domain::{Conversation, DomainError, PromptContext};
    use futures::stream::{self, StreamExt};

    struct Ticker;

    #[async_trait]
    impl LlmProvider for Ticker {
        async fn stream(&self, _prompt: &PromptContext) -> Result<TokenStream, DomainError> {
            Ok(stream::repeat_with(|| Ok("tick".to_string())).boxed())
        }
    }

    fn prompt() -> PromptContext {
        PromptContext {
            system: "Context: none".to_string(),
            human: "go".to_string(),
        }
    }

    #[tokio::test]
    async fn test_interrupt_cancels_answer_in_flight() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut conversation = Conversation::new();
        let cancel = CancelHandle::new();
        let mut stream = AnswerGenerator::new(Arc::new(Ticker)).generate(
            prompt(),
            vec![],
            &mut conversation,
            cancel.clone(),
        );

        let mut events = Vec::new();
        pump_events(&mut stream, &cancel, &mut rx, |event| {
            if events.len() == 2 {
                tx.send(()).unwrap();
            }
            events.push(event);
            Ok(())
        })
        .await
        .unwrap();
        drop(stream);

        assert!(cancel.is_cancelled());
        assert!(matches!(events[0], AnswerEvent::Token(_)));
        assert!(matches!(events.last(), Some(AnswerEvent::Cancelled)));
        assert!(conversation.is_empty());
    }

    #[tokio::test]
    async fn test_pump_without_interrupt_runs_to_completion() {
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let mut conversation = Conversation::new();
        let cancel = CancelHandle::new();

        struct Short;

        #[async_trait]
        impl LlmProvider for Short {
            async fn stream(&self, _prompt: &PromptContext) -> Result<TokenStream, DomainError> {
                Ok(stream::iter(vec![Ok("a".to_string()), Ok("b".to_string())]).boxed())
            }
        }

        let mut stream = AnswerGenerator::new(Arc::new(Short)).generate(
            prompt(),
            vec![],
            &mut conversation,
            cancel.clone(),
        );
        let mut events = Vec::new();
        pump_events(&mut stream, &cancel, &mut rx, |event| {
            events.push(event);
            Ok(())
        })
        .await
        .unwrap();
        drop(stream);

        assert_eq!(events.len(), 3);
        assert!(matches!(&events[2], AnswerEvent::Completed(a) if a.text == "ab"));
        assert_eq!(conversation.len(), 1);
    }
}
