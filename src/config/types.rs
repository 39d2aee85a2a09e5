use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

/// Root configuration for smshubd
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Deployment environment (selects queue transport and store backend defaults)
    #[serde(default)]
    pub environment: Environment,

    /// Submission API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Queue transport settings
    #[serde(default)]
    pub queue: QueueConfig,

    /// Message store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Delivery worker settings
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Telemetry configuration (logging, metrics)
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Shutdown behavior
    #[serde(default)]
    pub shutdown: ShutdownConfig,

    /// Tenants keyed by subscription key
    #[serde(default)]
    pub tenants: HashMap<String, TenantConfig>,
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Production,
}

/// Submission API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Bind address
    #[serde(default = "default_api_address")]
    pub address: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            address: default_api_address(),
        }
    }
}

fn default_api_address() -> SocketAddr {
    "0.0.0.0:8080".parse().unwrap()
}

/// Queue transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Transport backend
    #[serde(default)]
    pub backend: QueueBackend,

    /// Channel capacity for the in-process transport
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,

    /// Delay before a nacked event is redelivered
    #[serde(default = "default_redelivery_delay", with = "humantime_serde")]
    pub redelivery_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::default(),
            capacity: default_queue_capacity(),
            redelivery_delay: default_redelivery_delay(),
        }
    }
}

/// Available queue backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueBackend {
    #[default]
    InProcess,
}

fn default_queue_capacity() -> usize {
    10_000
}

fn default_redelivery_delay() -> Duration {
    Duration::from_secs(2)
}

/// Message store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Storage backend
    #[serde(default)]
    pub backend: StoreBackend,
}

/// Available store backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
}

/// Delivery worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum concurrent deliveries
    #[serde(default = "default_worker_concurrency")]
    pub concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_worker_concurrency(),
        }
    }
}

fn default_worker_concurrency() -> usize {
    16
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON-formatted logs
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Shutdown configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// How long to wait for in-flight deliveries before forcing termination
    #[serde(default = "default_drain_timeout", with = "humantime_serde")]
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: default_drain_timeout(),
        }
    }
}

fn default_drain_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Per-tenant configuration.
///
/// A tenant has a human-readable name and at most one config per channel;
/// at least one channel must be present (enforced by `Config::validate`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Human-readable tenant name
    pub name: String,

    /// HTTP provider channel
    #[serde(default)]
    pub http: Option<HttpChannelConfig>,

    /// SMPP telco channel
    #[serde(default)]
    pub smpp: Option<SmppChannelConfig>,
}

impl TenantConfig {
    /// Check whether the tenant has the given channel configured.
    pub fn has_channel(&self, channel: crate::store::ChannelType) -> bool {
        match channel {
            crate::store::ChannelType::Http => self.http.is_some(),
            crate::store::ChannelType::Smpp => self.smpp.is_some(),
        }
    }

    /// Max transient retries for the given channel.
    pub fn max_retries(&self, channel: crate::store::ChannelType) -> u32 {
        match channel {
            crate::store::ChannelType::Http => {
                self.http.as_ref().map(|c| c.max_retries).unwrap_or(0)
            }
            crate::store::ChannelType::Smpp => self
                .smpp
                .as_ref()
                .map(|c| c.failed_messages.max_retries)
                .unwrap_or(0),
        }
    }
}

/// SMS provider kind for the HTTP channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Generic,
    Twilio,
    Vonage,
    #[serde(rename = "messagebird")]
    MessageBird,
    #[serde(rename = "textmagic")]
    TextMagic,
    Custom,
}

/// Authentication scheme for the HTTP channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    #[default]
    Bearer,
    ApiKey,
    Basic,
    Hmac,
}

/// HTTP channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpChannelConfig {
    /// Provider endpoint URL
    pub endpoint: String,

    /// API key
    pub api_key: String,

    /// API secret (Basic auth password)
    #[serde(default)]
    pub api_secret: Option<String>,

    /// Extra headers added to every request
    #[serde(default)]
    pub custom_headers: HashMap<String, String>,

    /// Per-attempt request timeout
    #[serde(default = "default_http_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Maximum retry attempts
    #[serde(default = "default_http_max_retries")]
    pub max_retries: u32,

    /// Rate limiter capacity (requests per second)
    #[serde(default = "default_max_requests_per_second")]
    pub max_requests_per_second: u32,

    /// Circuit breaker settings
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Provider payload shape
    #[serde(default)]
    pub provider: ProviderKind,

    /// Sender id placed in the payload
    #[serde(default)]
    pub sender_id: Option<String>,

    /// Payload template (required iff provider is `custom`)
    #[serde(default)]
    pub payload_template: Option<String>,

    /// Authentication scheme
    #[serde(default)]
    pub auth: AuthKind,
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_http_max_retries() -> u32 {
    3
}

fn default_max_requests_per_second() -> u32 {
    10
}

/// Circuit breaker configuration, shared by both channels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long the circuit stays open before a trial request
    #[serde(default = "default_recovery_timeout", with = "humantime_serde")]
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout: default_recovery_timeout(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout() -> Duration {
    Duration::from_secs(30)
}

/// SMPP bind type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindType {
    #[default]
    Transceiver,
    Transmitter,
    Receiver,
}

/// SMPP channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmppChannelConfig {
    /// SMSC host
    pub host: String,

    /// SMSC port
    #[serde(default = "default_smpp_port")]
    pub port: u16,

    /// SMPP system_id
    pub system_id: String,

    /// SMPP password
    pub password: String,

    /// Source address placed in submit_sm
    pub source_address: String,

    /// Bind type
    #[serde(default)]
    pub bind_type: BindType,

    /// Connect with TLS
    #[serde(default)]
    pub use_tls: bool,

    /// enquire_link keep-alive interval
    #[serde(default = "default_enquire_link_interval", with = "humantime_serde")]
    pub enquire_link_interval: Duration,

    /// Per-request response timeout on the session
    #[serde(default = "default_inactivity_timeout", with = "humantime_serde")]
    pub inactivity_timeout: Duration,

    /// Connection pool settings
    #[serde(default)]
    pub pool: SmppPoolConfig,

    /// Submission pacing
    #[serde(default)]
    pub rate: SmppRateConfig,

    /// Circuit breaker settings
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Delivery receipt settings
    #[serde(default)]
    pub delivery_receipts: DeliveryReceiptConfig,

    /// ESME_RTHROTTLED backoff settings
    #[serde(default)]
    pub throttling: ThrottlingConfig,

    /// Failed message retry policy
    #[serde(default)]
    pub failed_messages: FailedMessageConfig,
}

fn default_smpp_port() -> u16 {
    2775
}

fn default_enquire_link_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_inactivity_timeout() -> Duration {
    Duration::from_secs(60)
}

/// SMPP connection pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmppPoolConfig {
    /// Connections pre-warmed at pool construction
    #[serde(default = "default_min_connections")]
    pub min_connections: usize,

    /// Maximum bound connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum idle connections retained
    #[serde(default = "default_max_connections")]
    pub max_idle: usize,

    /// Bound wait for connect + acquire
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Delay before replacing a disposed connection
    #[serde(default = "default_recovery_delay", with = "humantime_serde")]
    pub recovery_delay: Duration,
}

impl Default for SmppPoolConfig {
    fn default() -> Self {
        Self {
            min_connections: default_min_connections(),
            max_connections: default_max_connections(),
            max_idle: default_max_connections(),
            connect_timeout: default_connect_timeout(),
            recovery_delay: default_recovery_delay(),
        }
    }
}

fn default_min_connections() -> usize {
    1
}

fn default_max_connections() -> usize {
    4
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_recovery_delay() -> Duration {
    Duration::from_secs(5)
}

/// SMPP submission pacing settings (enforced on the client itself)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmppRateConfig {
    /// Maximum submit_sm per window
    #[serde(default = "default_max_messages_per_second")]
    pub max_messages_per_second: u32,

    /// Burst size
    #[serde(default = "default_max_messages_per_second")]
    pub burst: u32,

    /// Pacing window
    #[serde(default = "default_rate_window", with = "humantime_serde")]
    pub window: Duration,
}

impl Default for SmppRateConfig {
    fn default() -> Self {
        Self {
            max_messages_per_second: default_max_messages_per_second(),
            burst: default_max_messages_per_second(),
            window: default_rate_window(),
        }
    }
}

fn default_max_messages_per_second() -> u32 {
    50
}

fn default_rate_window() -> Duration {
    Duration::from_secs(1)
}

/// Delivery receipt settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReceiptConfig {
    /// Request delivery receipts on submit
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// registered_delivery mask
    #[serde(default = "default_dlr_mask")]
    pub dlr_mask: u8,

    /// How long correlations are retained before the sweeper drops them
    #[serde(default = "default_correlation_retention_days")]
    pub retention_days: u32,
}

impl Default for DeliveryReceiptConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dlr_mask: default_dlr_mask(),
            retention_days: default_correlation_retention_days(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_dlr_mask() -> u8 {
    1
}

fn default_correlation_retention_days() -> u32 {
    7
}

/// ESME_RTHROTTLED backoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottlingConfig {
    /// First backoff interval
    #[serde(default = "default_initial_backoff", with = "humantime_serde")]
    pub initial_backoff: Duration,

    /// Backoff ceiling
    #[serde(default = "default_max_backoff", with = "humantime_serde")]
    pub max_backoff: Duration,

    /// Backoff multiplier per consecutive throttle
    #[serde(default = "default_backoff_multiplier")]
    pub multiplier: u32,
}

impl Default for ThrottlingConfig {
    fn default() -> Self {
        Self {
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
            multiplier: default_backoff_multiplier(),
        }
    }
}

fn default_initial_backoff() -> Duration {
    Duration::from_secs(1)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> u32 {
    2
}

/// Failed message retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedMessageConfig {
    /// Maximum transient retries before a message fails permanently
    #[serde(default = "default_smpp_max_retries")]
    pub max_retries: u32,

    /// Escalating redelivery delays, in minutes
    #[serde(default = "default_retry_delay_minutes")]
    pub retry_delay_minutes: Vec<u64>,

    /// Age after which a failed message is dead-lettered
    #[serde(default = "default_dead_letter_after", with = "humantime_serde")]
    pub dead_letter_after: Duration,
}

impl Default for FailedMessageConfig {
    fn default() -> Self {
        Self {
            max_retries: default_smpp_max_retries(),
            retry_delay_minutes: default_retry_delay_minutes(),
            dead_letter_after: default_dead_letter_after(),
        }
    }
}

fn default_smpp_max_retries() -> u32 {
    3
}

fn default_retry_delay_minutes() -> Vec<u64> {
    vec![1, 5, 15]
}

fn default_dead_letter_after() -> Duration {
    Duration::from_secs(7 * 24 * 3600)
}
