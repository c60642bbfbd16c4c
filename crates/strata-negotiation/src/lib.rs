//! Negotiation between storage clients and hosts.
//!
//! A client and a host that do not trust each other form a contract, append data to it and
//! pay for reads, each step ending in a revision both sides signed. The host side runs on
//! [`StorageHost`], the client side on [`StorageClient`]; both talk over a [`Session`] and
//! reach the ledger, wallets and storage only through the traits in [`capability`].

pub mod capability;
pub mod client;
pub mod config;
pub mod error;
pub mod host;
pub mod host_selection;
pub mod lock;
pub mod logging;
pub mod memory;
pub mod message;
pub mod responsibility;
pub mod session;
pub mod state;

pub use capability::{Ledger, ResponsibilityStore, Wallet, WalletProvider};
pub use client::{ClientContract, ReadOutcome, StorageClient};
pub use config::{ClientConfig, HostConfig, LoggingConfig, NegotiationConfig};
pub use error::{ErrorKind, NegotiationError, Result};
pub use host::StorageHost;
pub use host_selection::{select_hosts, HostCandidate};
pub use lock::{ResponsibilityGuard, ResponsibilityLocks};
pub use logging::init_logging;
pub use memory::{KeypairWallet, MemoryLedger, MemoryResponsibilityStore, MemoryWalletProvider};
pub use message::{
    ContractCreateRequest, DownloadRequest, DownloadResponse, DownloadSection, Message,
    MessageCode, UploadAction, UploadMerkleProof, UploadRequest,
};
pub use responsibility::{HostFinancialMetrics, StorageResponsibility};
pub use session::{ChannelSession, PeerInfo, Session, SessionExt};
pub use state::{
    CreateState, DownloadState, HostCreateState, NegotiationState, ServeState, StateTracker,
    UploadState, WriteState,
};
