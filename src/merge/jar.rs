//! Merging a client jar and a server jar into one combined jar.

use super::{ClassMerger, MergeResult};
use crate::archive::{write_archive, JarReader, JarWriter};
use crate::classfile::codec::{decode_class, encode_class};
use crate::classfile::{class_name_of_entry, ClassCodec, ClassNode};
use crate::error::{ForgeError, Result};
use regex::Regex;
use rustc_hash::FxHashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Receives both sides of a failed class merge and the output being written
pub type MergeFailureHandler = Arc<dyn Fn(&ClassNode, &ClassNode, &ForgeError, &mut JarWriter) -> Result<()> + Send + Sync>;

/// What to do when a class cannot be merged
#[derive(Clone, Default)]
pub enum MergeFailurePolicy {
    /// Abort the whole merge
    #[default]
    Fatal,
    /// Write the client version and continue
    KeepClient,
    /// Leave the class out and continue
    SkipClass,
    Custom(MergeFailureHandler),
}

impl fmt::Debug for MergeFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fatal => f.write_str("Fatal"),
            Self::KeepClient => f.write_str("KeepClient"),
            Self::SkipClass => f.write_str("SkipClass"),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Class name globs; `*` stays within a package, `**` crosses packages
#[derive(Debug, Clone)]
pub struct IncludeFilter {
    patterns: Vec<Regex>,
}

impl IncludeFilter {
    pub fn new<S: AsRef<str>>(globs: &[S]) -> Result<Self> {
        let patterns = globs
            .iter()
            .map(|glob| {
                let glob = glob.as_ref();
                Regex::new(&glob_to_regex(glob))
                    .map_err(|e| ForgeError::configuration(format!("invalid include glob {glob}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Accepts every class
    pub fn all() -> Self {
        Self { patterns: Vec::new() }
    }

    pub fn matches(&self, class_name: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.is_match(class_name))
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(".*");
            },
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

/// Counters reported after a merge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub merged: usize,
    pub client_only: usize,
    pub server_only: usize,
    pub stripped: usize,
    pub failed: usize,
    pub resources: usize,
}

/// Merges client and server jars class by class
pub struct JarMerger {
    codec: Arc<dyn ClassCodec>,
    merger: ClassMerger,
    include: IncludeFilter,
    on_failure: MergeFailurePolicy,
}

impl fmt::Debug for JarMerger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JarMerger")
            .field("include", &self.include)
            .field("on_failure", &self.on_failure)
            .finish_non_exhaustive()
    }
}

impl JarMerger {
    pub fn new(codec: Arc<dyn ClassCodec>) -> Self {
        Self { codec, merger: ClassMerger::new(), include: IncludeFilter::all(), on_failure: MergeFailurePolicy::Fatal }
    }

    #[must_use]
    pub fn with_include(mut self, include: IncludeFilter) -> Self {
        self.include = include;
        self
    }

    #[must_use]
    pub fn with_failure_policy(mut self, policy: MergeFailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    #[must_use]
    pub fn with_merger(mut self, merger: ClassMerger) -> Self {
        self.merger = merger;
        self
    }

    /// Merge `client` and `server` into `output`. The output is deleted if the merge fails.
    pub fn merge(&self, client: &Path, server: &Path, output: &Path) -> Result<MergeStats> {
        let start = Instant::now();
        let mut client_jar = JarReader::open(client)?;
        let mut server_jar = JarReader::open(server)?;
        let client_entries = client_jar.entry_names();
        let server_entries: FxHashSet<String> = server_jar.entry_names().into_iter().collect();
        let mut stats = MergeStats::default();

        write_archive(output, |writer| {
            for entry in &client_entries {
                if skip_entry(entry) {
                    continue;
                }
                let server_bytes =
                    if server_entries.contains(entry) { Some(server_jar.read(entry)?) } else { None };
                let client_bytes = client_jar.read(entry)?;
                self.merge_entry(entry, Some(client_bytes), server_bytes, writer, &mut stats)?;
            }
            for entry in server_jar.entry_names() {
                if skip_entry(&entry) || writer.contains(&entry) || client_jar.contains(&entry) {
                    continue;
                }
                let bytes = server_jar.read(&entry)?;
                self.merge_entry(&entry, None, Some(bytes), writer, &mut stats)?;
            }
            Ok(())
        })?;

        info!(
            "[merge] merged {} + {} in {}ms: {:?}",
            client.display(),
            server.display(),
            start.elapsed().as_millis(),
            stats
        );
        Ok(stats)
    }

    fn merge_entry(
        &self,
        entry: &str,
        client: Option<Vec<u8>>,
        server: Option<Vec<u8>>,
        writer: &mut JarWriter,
        stats: &mut MergeStats,
    ) -> Result<()> {
        let Some(class_name) = class_name_of_entry(entry) else {
            // resource: client wins
            if let (Some(c), Some(s)) = (&client, &server) {
                if c != s {
                    debug!("[merge] resource {} differs between sides, keeping client", entry);
                }
            }
            stats.resources += 1;
            if let Some(bytes) = client.or(server) {
                writer.write_entry(entry, &bytes)?;
            }
            return Ok(());
        };

        if !self.include.matches(class_name) {
            stats.stripped += 1;
            return Ok(());
        }

        match (client, server) {
            (Some(bytes), None) => {
                stats.client_only += 1;
                writer.write_entry(entry, &bytes)
            },
            (None, Some(bytes)) => {
                stats.server_only += 1;
                writer.write_entry(entry, &bytes)
            },
            (Some(c), Some(s)) if c == s => {
                stats.merged += 1;
                writer.write_entry(entry, &c)
            },
            (Some(c), Some(s)) => {
                let client = decode_class(self.codec.as_ref(), entry, &c)?;
                let server = decode_class(self.codec.as_ref(), entry, &s)?;
                match self.merger.merge(Some(client), Some(server)) {
                    Some(MergeResult::Failed { client, server, error }) => {
                        stats.failed += 1;
                        self.handle_failure(entry, &c, &client, &server, error, writer)
                    },
                    Some(result) => {
                        stats.merged += 1;
                        match result.into_node() {
                            Some(node) => writer.write_entry(entry, &encode_class(self.codec.as_ref(), &node)?),
                            None => Ok(()),
                        }
                    },
                    None => Ok(()),
                }
            },
            (None, None) => Ok(()),
        }
    }

    fn handle_failure(
        &self,
        entry: &str,
        client_bytes: &[u8],
        client: &ClassNode,
        server: &ClassNode,
        error: ForgeError,
        writer: &mut JarWriter,
    ) -> Result<()> {
        match &self.on_failure {
            MergeFailurePolicy::Fatal => Err(error),
            MergeFailurePolicy::KeepClient => {
                warn!("[merge] {}, keeping client version", error);
                writer.write_entry(entry, client_bytes)
            },
            MergeFailurePolicy::SkipClass => {
                warn!("[merge] {}, skipping class", error);
                Ok(())
            },
            MergeFailurePolicy::Custom(handler) => handler(client, server, &error, writer),
        }
    }
}

/// Signature files and manifests of the inputs do not apply to the merged jar
fn skip_entry(entry: &str) -> bool {
    entry.starts_with("META-INF/")
}

/// Merge with the default policy and the given include globs
pub fn merge_jars<S: AsRef<str>>(
    codec: Arc<dyn ClassCodec>,
    include_globs: &[S],
    client: &Path,
    server: &Path,
    output: &Path,
) -> Result<MergeStats> {
    JarMerger::new(codec).with_include(IncludeFilter::new(include_globs)?).merge(client, server, output)
}
