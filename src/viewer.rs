//! File preview dispatch for the viewer modal.

use crate::config::PortalConfig;

const OFFICE_EXTENSIONS: &[&str] = &["doc", "docx", "xls", "xlsx", "ppt", "pptx"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg"];

/// How a file is shown, chosen from its extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendererKind {
    /// Embedded PDF viewer with toolbar and side panes hidden
    Pdf { src: String },
    /// External office preview service
    Office { src: String },
    Image { src: String },
    /// No preview; only a download link
    Unsupported { download_url: String },
}

impl RendererKind {
    /// Pick the renderer for `file_type` (an extension, any case, leading dot allowed).
    pub fn for_file(file_type: &str, file_url: &str, office_preview_url: &str) -> Self {
        let extension = file_type.trim().trim_start_matches('.').to_lowercase();

        if extension == "pdf" {
            RendererKind::Pdf {
                src: format!("{}#toolbar=0&navpanes=0", file_url),
            }
        } else if OFFICE_EXTENSIONS.contains(&extension.as_str()) {
            RendererKind::Office {
                src: format!("{}{}", office_preview_url, urlencoding::encode(file_url)),
            }
        } else if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            RendererKind::Image {
                src: file_url.to_string(),
            }
        } else {
            RendererKind::Unsupported {
                download_url: file_url.to_string(),
            }
        }
    }

    /// Frame or image source, `None` for the download-only fallback
    pub fn src(&self) -> Option<&str> {
        match self {
            RendererKind::Pdf { src } | RendererKind::Office { src } | RendererKind::Image { src } => {
                Some(src.as_str())
            }
            RendererKind::Unsupported { .. } => None,
        }
    }
}

/// Lower-case extension of a file name, if it has one
pub fn extension_of(file_name: &str) -> Option<String> {
    let (stem, extension) = file_name.rsplit_once('.')?;
    if stem.is_empty() || extension.is_empty() {
        return None;
    }
    Some(extension.to_lowercase())
}

/// Open viewer for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerModal {
    pub title: String,
    pub file_url: String,
    pub renderer: RendererKind,
    loading: bool,
}

impl ViewerModal {
    /// Open on a file; `file_type` falls back to the file name's extension.
    pub fn open(
        config: &PortalConfig,
        title: &str,
        file_name: &str,
        file_type: Option<&str>,
        file_url: &str,
    ) -> Self {
        let extension = file_type
            .map(str::to_string)
            .or_else(|| extension_of(file_name))
            .unwrap_or_default();
        let renderer = RendererKind::for_file(&extension, file_url, &config.office_preview_url);
        let loading = renderer.src().is_some();

        tracing::debug!(title, ?renderer, "Viewer opened");

        Self {
            title: title.to_string(),
            file_url: file_url.to_string(),
            renderer,
            loading,
        }
    }

    /// Loading overlay shown until the frame or image reports load
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn on_content_loaded(&mut self) {
        self.loading = false;
    }

    /// Download target, offered for every renderer
    pub fn download_url(&self) -> &str {
        &self.file_url
    }
}
