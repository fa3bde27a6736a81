//! Rendering worker binary.
//!
//! Reads one `ExtractRequest` on stdin, parses the document with the MuPDF
//! backend, and streams protocol messages on stdout: `ready` on startup,
//! `pageCount` after open, `progress` per page, `partialText` after every
//! `batchSize` pages (the last flush marked final). Parsing failures are
//! reported as `error` messages, never as raw panics on the wire.

use std::io::{self, BufRead, Write};

use anyhow::Context;

use pagelift_core::backend::RenderBackend;
use pagelift_protocol::{ExtractRequest, WorkerMessage};
use pagelift_render_mupdf::MupdfRenderer;

fn main() -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut request_line = String::new();
    stdin
        .lock()
        .read_line(&mut request_line)
        .context("reading extract request")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    let request = match ExtractRequest::decode(request_line.trim_end()) {
        Ok(request) => request,
        Err(e) => {
            emit(
                &mut out,
                &WorkerMessage::Error {
                    error: format!("bad extract request: {e}"),
                },
            )?;
            return Ok(());
        }
    };

    emit(&mut out, &WorkerMessage::Ready)?;
    run(&request, MupdfRenderer::new(), &mut out)
}

fn run(
    request: &ExtractRequest,
    backend: impl RenderBackend,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let bytes = match request.document_bytes() {
        Ok(bytes) => bytes,
        Err(e) => return report(out, format!("bad document payload: {e}")),
    };

    // MuPDF opens by path, so the payload lands in a throwaway file.
    let mut scratch = tempfile::NamedTempFile::new().context("creating scratch file")?;
    scratch
        .write_all(&bytes)
        .context("writing scratch document")?;

    let document = match backend.open(scratch.path()) {
        Ok(document) => document,
        Err(e) => return report(out, format!("cannot open document: {e}")),
    };

    let total = match document.page_count() {
        Ok(0) => return report(out, "document has no pages".into()),
        Ok(total) => total,
        Err(e) => return report(out, format!("cannot count pages: {e}")),
    };

    emit(out, &WorkerMessage::PageCount { total_pages: total })?;

    let batch = u64::from(request.batch_size);
    let mut buffer = String::new();

    for index in 0..total {
        let page = index + 1;
        match document.page_text(index) {
            Ok(text) => {
                buffer.push_str(&text);
                buffer.push('\n');
            }
            Err(e) => return report(out, format!("page {page} failed: {e}")),
        }

        emit(
            out,
            &WorkerMessage::Progress {
                current_page: page,
                total_pages: total,
            },
        )?;

        let is_last = page == total;
        if is_last || page % batch == 0 {
            emit(
                out,
                &WorkerMessage::PartialText {
                    text: std::mem::take(&mut buffer),
                    is_final: is_last,
                },
            )?;
        }
    }

    Ok(())
}

fn report(out: &mut impl Write, error: String) -> anyhow::Result<()> {
    emit(out, &WorkerMessage::Error { error })
}

fn emit(out: &mut impl Write, message: &WorkerMessage) -> anyhow::Result<()> {
    let line = message.encode().context("encoding message")?;
    writeln!(out, "{line}").context("writing message")?;
    out.flush().context("flushing stdout")?;
    Ok(())
}
