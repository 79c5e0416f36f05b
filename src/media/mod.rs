//! Download pipeline for listing images queued by the reconciler

pub mod downloader;

pub use downloader::{local_path_for, DownloadReport, ImageDownloader, MediaConfig};
