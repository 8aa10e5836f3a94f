//! Streaming extraction over many drawings.
//!
//! Each drawing goes through its own two-pass run; nothing is shared between
//! documents except the [`Extractor`] itself. Up to `config.concurrency`
//! documents are in flight at once and results are emitted in completion
//! order, tagged with the input they came from.

use crate::error::ExtractError;
use crate::extract::Extractor;
use crate::output::ExtractionOutput;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::{info, warn};

/// One finished document: its input string and the outcome.
pub type DocumentResult = (String, Result<ExtractionOutput, ExtractError>);

/// A boxed stream of per-document results.
pub type ExtractionStream<'a> = Pin<Box<dyn Stream<Item = DocumentResult> + Send + 'a>>;

/// Extract many drawings, yielding each as soon as it completes.
///
/// A failure of one document is reported in its item and does not stop the
/// others.
///
/// # Example
/// ```rust,no_run
/// use edgequake_drawing2json::{extract_stream, ExtractionConfig, Extractor};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let extractor = Extractor::new(ExtractionConfig::default())?;
/// let inputs = vec!["a.pdf".to_string(), "b.pdf".to_string()];
/// let mut results = extract_stream(inputs, &extractor);
/// while let Some((input, outcome)) = results.next().await {
///     match outcome {
///         Ok(out) => println!("{input}: {} fields", out.result.table1.len()),
///         Err(e) => eprintln!("{input}: {e}"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn extract_stream<'a, I>(inputs: I, extractor: &'a Extractor) -> ExtractionStream<'a>
where
    I: IntoIterator<Item = String>,
    I::IntoIter: Send + 'a,
{
    let concurrency = extractor.config().concurrency.max(1);
    let s = stream::iter(inputs.into_iter().map(move |input| async move {
        let outcome = extractor.extract(&input).await;
        if let Err(ref e) = outcome {
            warn!("{}: {}", input, e);
        }
        (input, outcome)
    }))
    .buffer_unordered(concurrency);
    Box::pin(s)
}

/// Extract many drawings and collect every result.
///
/// Results keep the order of `inputs`.
pub async fn extract_batch<I>(inputs: I, extractor: &Extractor) -> Vec<DocumentResult>
where
    I: IntoIterator<Item = String>,
    I::IntoIter: Send,
{
    let inputs: Vec<String> = inputs.into_iter().collect();
    let total = inputs.len();
    info!("Batch extraction: {} documents", total);

    let mut indexed: Vec<(usize, DocumentResult)> = {
        let order: Vec<(usize, String)> = inputs.into_iter().enumerate().collect();
        let concurrency = extractor.config().concurrency.max(1);
        stream::iter(order.into_iter().map(|(i, input)| async move {
            let outcome = extractor.extract(&input).await;
            (i, (input, outcome))
        }))
        .buffer_unordered(concurrency)
        .collect()
        .await
    };
    indexed.sort_by_key(|(i, _)| *i);

    let failed = indexed.iter().filter(|(_, (_, r))| r.is_err()).count();
    info!("Batch complete: {}/{} succeeded", total - failed, total);
    indexed.into_iter().map(|(_, r)| r).collect()
}
