pub mod error;
pub mod codec;
pub mod fragment;
pub mod chunker;
pub mod retry;
pub mod diagnostics;
pub mod transport;
pub mod recovery;
pub mod assembler;
pub mod session;
pub mod upload;
pub mod confirm;
pub mod container;
pub mod source;
pub mod config;
pub mod vault;

pub use error::{Result, VaultError};
pub use codec::{CanvasGeometry, CodecError, Framing, PixelBuffer, decode, decode_with, encode};
pub use fragment::{Fragment, FragmentMeta, checksum};
pub use chunker::{FragmentCount, Fragmenter};
pub use retry::{RetryError, RetryPolicy};
pub use diagnostics::{DiagnosticEntry, DiagnosticLog, Diagnostics};
pub use transport::{ContainerId, ContainerInfo, FragmentId, FragmentRecord, Transport, TransportError};
pub use recovery::{resolve_duplicates, ResolutionReport};
pub use assembler::{download, DownloadReport};
pub use session::{SessionVerdict, UploadSession};
pub use upload::{upload, UploadReport};
pub use confirm::{Confirm, Preapproved};
pub use container::DeleteOutcome;
pub use config::Config;
pub use vault::{Vault, VaultOptions};
