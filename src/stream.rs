//! Streaming batch API: emit documents as they complete.
//!
//! Unlike [`crate::convert::process_batch`], which returns only after every
//! document finishes, [`process_stream`] yields each result as soon as it is
//! ready, so callers can write outputs or update a progress display
//! incrementally. Results arrive in completion order; each carries the
//! index of its input.

use crate::config::PipelineConfig;
use crate::convert::{process, tracked};
use crate::document::{OutputDocument, SourceDocument};
use crate::error::PipelineError;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// One streamed result: the input index and the document's outcome.
#[derive(Debug)]
pub struct StreamItem {
    pub index: usize,
    pub source_name: String,
    pub result: Result<OutputDocument, PipelineError>,
}

/// A boxed stream of per-document results.
pub type DocumentStream = Pin<Box<dyn Stream<Item = StreamItem> + Send>>;

/// Convert documents concurrently, streaming results as they are ready.
///
/// At most `config.concurrency` documents are in flight. Dropping the stream
/// cancels the documents still pending; finished results are unaffected.
///
/// # Example
/// ```rust,no_run
/// use aozora_tokenize::{process_stream, PipelineConfig, SourceDocument};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() {
/// let docs = vec![SourceDocument::new("a.html", std::fs::read("a.html").unwrap())];
/// let mut results = process_stream(docs, &PipelineConfig::default());
/// while let Some(item) = results.next().await {
///     match item.result {
///         Ok(out) => println!("{}: {} bytes", out.output_name, out.text.len()),
///         Err(e) => eprintln!("{}: {e}", item.source_name),
///     }
/// }
/// # }
/// ```
pub fn process_stream(docs: Vec<SourceDocument>, config: &PipelineConfig) -> DocumentStream {
    let total = docs.len();
    info!("Streaming {} documents", total);
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let concurrency = config.concurrency;
    let config = config.clone();

    let s = stream::iter(docs.into_iter().enumerate().map(move |(index, doc)| {
        let cfg = config.clone();
        async move {
            let result = tracked(
                cfg.progress_callback.as_ref(),
                index,
                total,
                &doc.name,
                process(&doc, &cfg),
                |out: &OutputDocument| out.text.len(),
            )
            .await;
            StreamItem {
                index,
                source_name: doc.name,
                result,
            }
        }
    }))
    .buffer_unordered(concurrency);

    Box::pin(s)
}
