//! Shared constants for the clipscribe captioner.

use std::time::Duration;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const API_VERSION: &str = "v1beta";

pub const API_KEY_ENV_VARS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_API_KEY"];

/// Used when listing fails or nothing usable is advertised.
pub const DEFAULT_MODEL: &str = "models/gemini-1.5-flash";

/// Most-preferred first. Matched as substrings of the advertised model name.
pub const MODEL_PRIORITIES: &[&str] = &[
    "gemini-2.5-flash",
    "gemini-3.0-flash",
    "gemini-2.5-pro",
    "gemini-2.5",
    "gemini-3.0-pro",
    "gemini-3.0",
    "gemini-2.0-flash",
    "gemini-2.0-pro",
    "gemini-1.5-flash",
    "gemini-1.5-pro",
    "gemini-flash",
    "gemini-pro",
];

pub const GENERATE_CONTENT_METHOD: &str = "generateContent";

/// Matched case-sensitively against the file extension.
pub const MEDIA_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm"];
pub const FALLBACK_MIME: &str = "video/mp4";

pub const DEFAULT_STORE_FILE: &str = "captions.json";

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_INTER_FILE_DELAY: Duration = Duration::from_secs(10);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

pub const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";
pub const INVALID_KEY_REASON: &str = "API_KEY_INVALID";
