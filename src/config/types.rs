use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main configuration structure for Sumi-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    pub spider: CrawlSpec,
}

/// Engine-wide settings, passed explicitly into the runner and fetchers
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EngineConfig {
    /// Maximum number of concurrent fetches within one batch
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User agent sent with every request
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Proxy URL applied to all requests
    #[serde(default)]
    pub proxy: Option<String>,

    /// Extra request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Treat non-2xx responses as failed fetches
    #[serde(default = "default_strict")]
    pub strict: bool,

    /// Directory receiving per-page locations during a run
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Directory receiving finalized results
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Path to the SQLite database holding result records
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
            user_agent: None,
            proxy: None,
            headers: BTreeMap::new(),
            strict: default_strict(),
            work_dir: default_work_dir(),
            storage_dir: default_storage_dir(),
            database_path: default_database_path(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_strict() -> bool {
    true
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("./harvest-tmp")
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("./harvest-storage")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./harvest.db")
}

fn default_max_depth() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// Declarative description of one crawl
///
/// Immutable for the duration of a run.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlSpec {
    pub name: String,

    /// Maximum traversal depth; root URLs live at depth 1
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Selectors for links leading to further listing pages
    #[serde(default)]
    pub expand_links: Vec<String>,

    /// Root URL entries, possibly parameterized
    pub urls: Vec<RootUrl>,

    #[serde(default)]
    pub data_items: Vec<DataItemSpec>,
}

/// A root URL, optionally expanded by a number or text pattern
///
/// `{0}` inside `base` is replaced by each pattern value.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RootUrl {
    pub base: String,

    /// `[start, stop, step]`, stop exclusive
    #[serde(default)]
    pub number_pattern: Option<Vec<i64>>,

    #[serde(default)]
    pub text_pattern: Option<Vec<String>>,
}

/// One kind of record found on listing pages
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DataItemSpec {
    pub name: String,

    /// Selector scoping each item instance; empty means the whole document
    #[serde(default)]
    pub base: Option<String>,

    #[serde(default)]
    pub collectors: Vec<CollectorSpec>,
}

impl DataItemSpec {
    pub fn base_path(&self) -> Option<&str> {
        non_empty(self.base.as_deref())
    }
}

/// How to reach and carve the fields of one item
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CollectorSpec {
    /// Selector (relative to the item base) of the link holding the data;
    /// empty means the data lives inside the base element itself
    #[serde(default)]
    pub link: Option<String>,

    /// Download images found inside `html` fields
    #[serde(default = "default_true")]
    pub get_image: bool,

    #[serde(default)]
    pub replace_rules: Vec<ReplaceRule>,

    #[serde(default)]
    pub selectors: Vec<FieldSelectorSpec>,
}

impl CollectorSpec {
    pub fn link_path(&self) -> Option<&str> {
        non_empty(self.link.as_deref())
    }
}

/// Extraction rule for a single field
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FieldSelectorSpec {
    /// Unique within its collector
    pub key: String,

    pub path: String,

    /// Read this attribute instead of the node content
    #[serde(default)]
    pub attribute: Option<String>,

    #[serde(default)]
    pub kind: ContentKind,

    /// OR of AND-groups; at least one group must be fully present
    #[serde(default)]
    pub required_words: Vec<WordGroup>,

    /// Any of these present rejects the item
    #[serde(default)]
    pub black_words: Vec<String>,
}

impl FieldSelectorSpec {
    pub fn attribute_name(&self) -> Option<&str> {
        non_empty(self.attribute.as_deref())
    }
}

/// Kind of content a field produces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    #[default]
    Html,
    Binary,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Html => "html",
            Self::Binary => "binary",
        }
    }
}

/// Words that must all be present
///
/// Accepts either a single word or a list of words in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawWordGroup")]
pub struct WordGroup(pub Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawWordGroup {
    One(String),
    All(Vec<String>),
}

impl From<RawWordGroup> for WordGroup {
    fn from(raw: RawWordGroup) -> Self {
        match raw {
            RawWordGroup::One(word) => WordGroup(vec![word]),
            RawWordGroup::All(words) => WordGroup(words),
        }
    }
}

/// Regex substitution applied while refining field content
///
/// Accepts either a bare pattern (replaced by nothing) or a
/// `[pattern, replacement]` pair in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawReplaceRule")]
pub struct ReplaceRule {
    pub pattern: String,
    pub replacement: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawReplaceRule {
    Pattern(String),
    Pair(String, String),
}

impl From<RawReplaceRule> for ReplaceRule {
    fn from(raw: RawReplaceRule) -> Self {
        match raw {
            RawReplaceRule::Pattern(pattern) => ReplaceRule {
                pattern,
                replacement: String::new(),
            },
            RawReplaceRule::Pair(pattern, replacement) => ReplaceRule {
                pattern,
                replacement,
            },
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
