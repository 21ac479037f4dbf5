// Visualplatform API Client
//
// Client library for the TwentyThree Visualplatform media API. The callable
// surface is generated from a flat endpoint table: every endpoint is
// reachable by its literal path ("/api/photo/list") or a dotted alias
// ("photo.list"), cacheable reads go out as unauthenticated GETs, and
// everything else is POSTed with a one-legged OAuth 1.0a HMAC-SHA1
// signature. Responses of varying quality are normalized into a single
// success value or typed error.
//
// Architecture:
// - endpoints: endpoint tables + compiled call surface (paths, aliases, namespaces)
// - request: per-call classification (cached GET / signed POST / multipart upload)
// - signer: OAuth 1.0a authorization headers
// - transport: single-resolution wire dispatch
// - response: JSON parsing, bounded repair, status checks, concatenate merging
// - client: the public client tying the layers together

// Shared error types
pub mod error;

// Endpoint tables and the compiled call surface
pub mod endpoints;

// OAuth 1.0a request signing
pub mod signer;

// Internal call pipeline
mod request;
mod response;
mod transport;

// The public client
pub mod client;

// Re-export the main types for convenience
pub use client::{Namespace, Params, Visualplatform};
pub use endpoints::{CallSurface, EndpointDescriptor, EndpointTable, UploadDescriptor};
pub use error::{Result, VisualplatformError};
pub use signer::Signer;
