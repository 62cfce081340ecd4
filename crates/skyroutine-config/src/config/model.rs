use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use skyroutine_utils::types::{ConfigSource, FailurePolicy, RoutineStrategy, WaitMode};

/// Default per-command timeout in seconds
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;
/// Poll interval used when `wait_mode = "poll"`
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
/// Platform tag passed as the trailing driver parameter
pub const DEFAULT_PLATFORM: &str = "AUAVsim";
/// Endpoint used for any driver without its own `[transport.endpoints]` entry
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:5117";
/// Trace store data endpoint for bulk retrieval
pub const DEFAULT_DATA_ENDPOINT: &str = "127.0.0.1:44044";
/// Query descriptor sent with every `qrb` command
pub const DEFAULT_QUERY_DESCRIPTOR: &str = "face";
/// Upper bound on a single retrieved payload
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 64 * 1024 * 1024;
/// Default timeout for the external classifier
pub const DEFAULT_CLASSIFIER_TIMEOUT_SECS: u64 = 60;

/// Effective configuration for a routine run.
///
/// Built by [`Config::discover`] / [`Config::discover_from`], or directly via
/// `Config::default()` for embedding and tests.
///
/// # Configuration File Format
///
/// ```toml
/// [routine]
/// strategy = "bulk_retrieval"
/// failure_policy = "continue"
/// command_timeout_secs = 30
///
/// [services]
/// flight = "org.reroutlab.code.auav.drivers.FlyDroneDriver"
///
/// [transport.endpoints]
/// "org.reroutlab.code.auav.drivers.FlyDroneDriver" = "http://127.0.0.1:5118"
///
/// [retrieval]
/// data_endpoint = "127.0.0.1:44044"
/// positives_dir = "selfies"
///
/// [classifier]
/// program = "face-detect"
/// args = ["--cascade", "haarcascade_frontalface_default.xml"]
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub routine: RoutineConfig,
    pub services: ServicesConfig,
    pub transport: TransportConfig,
    pub retrieval: RetrievalConfig,
    pub classifier: ClassifierConfig,
    /// Source attribution for each setting (for `skyroutine config`).
    #[serde(skip)]
    pub source_attribution: HashMap<String, ConfigSource>,
}

/// `[routine]` section, resolved
#[derive(Debug, Clone, Serialize)]
pub struct RoutineConfig {
    /// Platform tag sent as the trailing `dp=` parameter of every command
    pub platform: String,
    pub strategy: RoutineStrategy,
    pub failure_policy: FailurePolicy,
    /// Issue `dc=dmp` to the camera after capture
    pub dump_captures: bool,
    pub command_timeout_secs: u64,
    pub wait_mode: WaitMode,
    pub poll_interval_ms: u64,
    pub verbose: bool,
}

/// `[services]` section: driver ids for each role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    pub flight: String,
    pub gimbal: String,
    pub camera: String,
    pub trace: String,
}

/// `[transport]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub default_endpoint: String,
    /// Per-driver endpoint overrides keyed by service id
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
}

/// `[retrieval]` section
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalConfig {
    /// `host:port` of the trace store's raw byte stream
    pub data_endpoint: String,
    pub query_descriptor: String,
    /// Transient working file each payload is staged into
    pub working_image: PathBuf,
    /// Local copy of the captured image checked under `capture_only`.
    /// Defaults to the routine's working directory parameter.
    pub capture_image: Option<PathBuf>,
    pub positives_dir: PathBuf,
    pub negatives_dir: PathBuf,
    pub file_prefix: String,
    pub file_extension: String,
    /// Stop after this many payloads even without the empty sentinel
    pub max_payloads: Option<u64>,
    pub max_payload_bytes: usize,
    /// Per-read stall timeout on the data connection
    pub read_timeout_secs: Option<u64>,
}

/// `[classifier]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// External detector program. `None` means no classifier is configured.
    pub program: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for RoutineConfig {
    fn default() -> Self {
        Self {
            platform: DEFAULT_PLATFORM.to_string(),
            strategy: RoutineStrategy::default(),
            failure_policy: FailurePolicy::default(),
            dump_captures: false,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            wait_mode: WaitMode::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            verbose: false,
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            flight: "org.reroutlab.code.auav.drivers.FlyDroneDriver".to_string(),
            gimbal: "org.reroutlab.code.auav.drivers.DroneGimbalDriver".to_string(),
            camera: "org.reroutlab.code.auav.drivers.CaptureImageDriver".to_string(),
            trace: "org.reroutlab.code.auav.drivers.ExternalTraceDriver".to_string(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            default_endpoint: DEFAULT_ENDPOINT.to_string(),
            endpoints: BTreeMap::new(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            data_endpoint: DEFAULT_DATA_ENDPOINT.to_string(),
            query_descriptor: DEFAULT_QUERY_DESCRIPTOR.to_string(),
            working_image: PathBuf::from("tmp.jpg"),
            capture_image: None,
            positives_dir: PathBuf::from("positives"),
            negatives_dir: PathBuf::from("negatives"),
            file_prefix: "image_".to_string(),
            file_extension: "jpg".to_string(),
            max_payloads: None,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            read_timeout_secs: None,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            timeout_secs: DEFAULT_CLASSIFIER_TIMEOUT_SECS,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            routine: RoutineConfig::default(),
            services: ServicesConfig::default(),
            transport: TransportConfig::default(),
            retrieval: RetrievalConfig::default(),
            classifier: ClassifierConfig::default(),
            source_attribution: HashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// On-disk shape: every field optional so a file only has to name what it changes
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TomlConfig {
    pub routine: Option<RoutineFile>,
    pub services: Option<ServicesFile>,
    pub transport: Option<TransportFile>,
    pub retrieval: Option<RetrievalFile>,
    pub classifier: Option<ClassifierFile>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RoutineFile {
    pub platform: Option<String>,
    pub strategy: Option<RoutineStrategy>,
    pub failure_policy: Option<FailurePolicy>,
    pub dump_captures: Option<bool>,
    pub command_timeout_secs: Option<u64>,
    pub wait_mode: Option<WaitMode>,
    pub poll_interval_ms: Option<u64>,
    pub verbose: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ServicesFile {
    pub flight: Option<String>,
    pub gimbal: Option<String>,
    pub camera: Option<String>,
    pub trace: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TransportFile {
    pub default_endpoint: Option<String>,
    pub endpoints: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RetrievalFile {
    pub data_endpoint: Option<String>,
    pub query_descriptor: Option<String>,
    pub working_image: Option<PathBuf>,
    pub capture_image: Option<PathBuf>,
    pub positives_dir: Option<PathBuf>,
    pub negatives_dir: Option<PathBuf>,
    pub file_prefix: Option<String>,
    pub file_extension: Option<String>,
    pub max_payloads: Option<u64>,
    pub max_payload_bytes: Option<usize>,
    pub read_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ClassifierFile {
    pub program: Option<String>,
    pub args: Option<Vec<String>>,
    pub timeout_secs: Option<u64>,
}
