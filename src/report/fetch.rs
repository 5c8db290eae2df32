use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kuchiki::NodeRef;
use kuchiki::traits::TendrilSink;
use reqwest::blocking::Client as HttpClient;
use tracing::{debug, info, warn};

use crate::error::ReportError;

/// Source of report pages. The HTTP implementation is used for real runs;
/// tests supply canned pages.
pub trait PageFetcher {
    fn fetch(&self, url: &str) -> Result<String, ReportError>;
}

pub struct HttpFetcher {
    client: HttpClient,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, ReportError> {
        let client = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| ReportError::ExternalService {
                target: "http client".to_string(),
                detail: err.to_string(),
            })?;
        Ok(Self { client })
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String, ReportError> {
        let service_error = |detail: String| ReportError::ExternalService {
            target: url.to_string(),
            detail,
        };

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| service_error(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(service_error(format!("HTTP {status}")));
        }
        response.text().map_err(|err| service_error(err.to_string()))
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DownloadSummary {
    pub pages: usize,
    pub frames: usize,
}

/// Saves the report index, every match page it links to below `report_url`,
/// and the frames those pages embed (one level) into `dest_dir`.
///
/// Pages are written to a staging directory first and moved into place only
/// once every fetch succeeded; on error nothing is left at `dest_dir`.
pub fn download_report(
    fetcher: &dyn PageFetcher,
    report_url: &str,
    dest_dir: &Path,
) -> Result<DownloadSummary, ReportError> {
    let staging_dir = staging_path(dest_dir);
    remove_dir_if_present(&staging_dir)?;
    fs::create_dir_all(&staging_dir).map_err(|err| ReportError::io(&staging_dir, err))?;

    match download_into(fetcher, report_url, &staging_dir) {
        Ok(summary) => {
            remove_dir_if_present(dest_dir)?;
            fs::rename(&staging_dir, dest_dir).map_err(|err| ReportError::io(dest_dir, err))?;
            info!(
                dest = %dest_dir.display(),
                pages = summary.pages,
                frames = summary.frames,
                "downloaded moss report"
            );
            Ok(summary)
        }
        Err(err) => {
            if let Err(cleanup) = fs::remove_dir_all(&staging_dir) {
                warn!(
                    path = %staging_dir.display(),
                    error = %cleanup,
                    "failed to remove partial download"
                );
            }
            Err(err)
        }
    }
}

fn download_into(
    fetcher: &dyn PageFetcher,
    report_url: &str,
    dir: &Path,
) -> Result<DownloadSummary, ReportError> {
    let mut summary = DownloadSummary::default();

    let index = fetch_document(fetcher, report_url)?;
    save_document(&index, &dir.join("index.html"))?;
    summary.pages += 1;

    for page_url in report_links(&index, report_url) {
        let page = fetch_document(fetcher, &page_url)?;
        save_document(&page, &dir.join(basename(&page_url)?))?;
        summary.pages += 1;

        for src in frame_sources(&page) {
            let frame_url = join_url(report_url, &src);
            let frame = fetch_document(fetcher, &frame_url)?;
            save_document(&frame, &dir.join(basename(&src)?))?;
            summary.frames += 1;
        }
    }

    Ok(summary)
}

fn fetch_document(fetcher: &dyn PageFetcher, url: &str) -> Result<NodeRef, ReportError> {
    debug!(url, "fetching report page");
    let body = fetcher.fetch(url)?;
    Ok(kuchiki::parse_html().one(body))
}

fn save_document(document: &NodeRef, path: &Path) -> Result<(), ReportError> {
    fs::write(path, document.to_string()).map_err(|err| ReportError::io(path, err))
}

/// Link targets that stay inside the report, deduplicated in a stable order.
fn report_links(document: &NodeRef, report_url: &str) -> BTreeSet<String> {
    let Ok(links) = document.select("a[href]") else {
        return BTreeSet::new();
    };
    links
        .filter_map(|link| link.attributes.borrow().get("href").map(str::to_string))
        .filter(|href| href.starts_with(report_url))
        .collect()
}

fn frame_sources(document: &NodeRef) -> Vec<String> {
    let Ok(frames) = document.select("frame[src]") else {
        return Vec::new();
    };
    frames
        .filter_map(|frame| frame.attributes.borrow().get("src").map(str::to_string))
        .collect()
}

fn join_url(base: &str, relative: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        relative.trim_start_matches('/')
    )
}

fn basename(url: &str) -> Result<String, ReportError> {
    url.split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ReportError::format(url, "link target has no file name"))
}

fn staging_path(dest_dir: &Path) -> PathBuf {
    let mut name = dest_dir
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    dest_dir.with_file_name(name)
}

fn remove_dir_if_present(path: &Path) -> Result<(), ReportError> {
    if path.exists() {
        fs::remove_dir_all(path).map_err(|err| ReportError::io(path, err))?;
    }
    Ok(())
}
