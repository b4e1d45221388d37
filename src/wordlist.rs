// src/wordlist.rs
//! Candidate word sources.
//!
//! Every source is consumed through a [`WordStream`], which yields trimmed,
//! non-empty records one at a time. Files and remote bodies are read
//! incrementally; nothing requires the whole list in memory unless the caller
//! asks for [`WordlistSource::load_all`].

use crate::error::{ErrorContext, Result};
use crate::types::SubcollectorError;
use futures::TryStreamExt;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::io::StreamReader;

#[derive(Debug, Clone, PartialEq)]
pub enum WordlistSource {
    File(PathBuf),
    Url(String),
    Inline(Arc<[String]>),
}

impl WordlistSource {
    /// `http://` and `https://` arguments are remote lists, anything else a path.
    pub fn parse(value: &str) -> Self {
        match url::Url::parse(value) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                WordlistSource::Url(value.to_string())
            }
            _ => WordlistSource::File(PathBuf::from(value)),
        }
    }

    pub fn inline<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        WordlistSource::Inline(words.into_iter().map(Into::into).collect())
    }

    pub fn describe(&self) -> String {
        match self {
            WordlistSource::File(path) => path.display().to_string(),
            WordlistSource::Url(url) => url.clone(),
            WordlistSource::Inline(words) => format!("<{} inline words>", words.len()),
        }
    }

    /// Number of records when it can be known up front. Remote sources
    /// report `None`.
    pub async fn estimate_size(&self) -> Result<Option<usize>> {
        match self {
            WordlistSource::File(path) => {
                let path = path.clone();
                let count = tokio::task::spawn_blocking(move || crate::utils::count_lines(&path))
                    .await
                    .wordlist_context(|| "Line counting task failed".to_string())?
                    .wordlist_context(|| "Failed to read wordlist".to_string())?;
                Ok(Some(count))
            }
            WordlistSource::Url(_) => Ok(None),
            WordlistSource::Inline(words) => Ok(Some(words.len())),
        }
    }

    pub async fn open(&self, client: &reqwest::Client) -> Result<WordStream> {
        match self {
            WordlistSource::File(path) => open_file(path).await,
            WordlistSource::Url(url) => open_url(client, url).await,
            WordlistSource::Inline(words) => Ok(WordStream::Memory {
                words: words.clone(),
                next: 0,
            }),
        }
    }

    pub async fn load_all(&self, client: &reqwest::Client) -> Result<Vec<String>> {
        let mut stream = self.open(client).await?;
        let mut words = Vec::new();
        while let Some(word) = stream.next_word().await? {
            words.push(word);
        }
        Ok(words)
    }
}

type BoxedReader = Pin<Box<dyn AsyncBufRead + Send>>;

async fn open_file(path: &Path) -> Result<WordStream> {
    let file = tokio::fs::File::open(path)
        .await
        .wordlist_context(|| format!("Failed to open wordlist {}", path.display()))?;
    let reader: BoxedReader = Box::pin(BufReader::new(file));
    Ok(WordStream::reader(reader))
}

async fn open_url(client: &reqwest::Client, url: &str) -> Result<WordStream> {
    let response = client
        .get(url)
        .send()
        .await
        .wordlist_context(|| format!("Failed to download wordlist {}", url))?;

    if !response.status().is_success() {
        return Err(SubcollectorError::WordlistLoad(format!(
            "Failed to download wordlist {}: HTTP {}",
            url,
            response.status()
        )));
    }

    let body = response
        .bytes_stream()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
    let reader: BoxedReader = Box::pin(StreamReader::new(body));
    Ok(WordStream::reader(reader))
}

/// Records are separated by `\n`, `\r` or both. Records that are not valid
/// UTF-8 are skipped and counted rather than failing the whole source.
pub enum WordStream {
    Reader {
        reader: BoxedReader,
        record: Vec<u8>,
        invalid: usize,
    },
    Memory { words: Arc<[String]>, next: usize },
}

impl std::fmt::Debug for WordStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WordStream::Reader { invalid, .. } => f
                .debug_struct("WordStream::Reader")
                .field("invalid", invalid)
                .finish(),
            WordStream::Memory { words, next } => f
                .debug_struct("WordStream::Memory")
                .field("len", &words.len())
                .field("next", next)
                .finish(),
        }
    }
}

fn is_separator(byte: u8) -> bool {
    byte == b'\n' || byte == b'\r'
}

/// Fills `record` with the bytes up to the next separator. Returns `false`
/// at end of input with nothing read.
async fn read_record(reader: &mut BoxedReader, record: &mut Vec<u8>) -> io::Result<bool> {
    record.clear();
    loop {
        let (found, used) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(!record.is_empty());
            }
            match available.iter().position(|&b| is_separator(b)) {
                Some(end) => {
                    record.extend_from_slice(&available[..end]);
                    (true, end + 1)
                }
                None => {
                    record.extend_from_slice(available);
                    (false, available.len())
                }
            }
        };
        reader.consume(used);
        if found {
            return Ok(true);
        }
    }
}

impl WordStream {
    fn reader(reader: BoxedReader) -> Self {
        WordStream::Reader {
            reader,
            record: Vec::new(),
            invalid: 0,
        }
    }

    /// Next non-empty trimmed word, `None` at end of input.
    pub async fn next_word(&mut self) -> Result<Option<String>> {
        match self {
            WordStream::Reader {
                reader,
                record,
                invalid,
            } => loop {
                let more = read_record(reader, record)
                    .await
                    .wordlist_context(|| "Failed to read wordlist".to_string())?;
                if !more {
                    return Ok(None);
                }
                match std::str::from_utf8(record) {
                    Ok(word) => {
                        let word = word.trim();
                        if !word.is_empty() {
                            return Ok(Some(word.to_string()));
                        }
                    }
                    Err(_) => *invalid += 1,
                }
            },
            WordStream::Memory { words, next } => {
                while let Some(word) = words.get(*next) {
                    *next += 1;
                    let word = word.trim();
                    if !word.is_empty() {
                        return Ok(Some(word.to_string()));
                    }
                }
                Ok(None)
            }
        }
    }

    /// Records skipped so far because they were not valid UTF-8.
    pub fn invalid_records(&self) -> usize {
        match self {
            WordStream::Reader { invalid, .. } => *invalid,
            WordStream::Memory { .. } => 0,
        }
    }
}
