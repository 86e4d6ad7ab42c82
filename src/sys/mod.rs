pub mod traits;      // Contracts the gRPC service depends on
pub mod secrets;     // Redacted, zeroizing secret fields
pub mod settings;    // ConnectionSettings + persisted record
pub mod credentials; // Materializer: settings -> config.json
pub mod cleanup;     // Credential removal and stale sweep
pub mod verify;      // Connectivity check via `hyper info`
pub mod installer;   // Client download
