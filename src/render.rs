//! Plain-text rendering of the file view

use std::fmt::Write as _;

use crate::api::FileEntry;
use crate::auth::AuthContext;
use crate::browser::ViewState;

pub const TITLE: &str = "🔐 Secure File Downloads";

/// `name (N KB) • date` line for a file
pub fn file_line(state: &ViewState, file: &FileEntry) -> String {
    let date = file
        .modified_at()
        .map(|d| d.with_timezone(&chrono::Local).format("%Y-%m-%d").to_string())
        .or_else(|| file.last_modified.clone())
        .unwrap_or_default();
    let mut line = format!("{} ({} KB)", state.display_name(&file.name), file.size_kb());
    if !date.is_empty() {
        let _ = write!(line, " • {}", date);
    }
    line
}

/// Render the whole view for the given auth snapshot
pub fn render_view(auth: &AuthContext, state: &ViewState) -> String {
    if auth.is_loading {
        return "Loading authentication info...\n".to_string();
    }
    if let Some(ref error) = auth.error {
        return format!("⚠️ Authentication Error: {}\n", error);
    }

    let mut out = String::new();
    let _ = writeln!(out, "{}", TITLE);

    let user = match auth.user.as_ref().filter(|_| auth.is_authenticated()) {
        Some(user) => user,
        None => {
            let _ = writeln!(out, "Please sign in to view and download files.");
            return out;
        }
    };

    let _ = writeln!(out, "Welcome, {}", user.display_name());
    if !state.search.is_empty() {
        let _ = writeln!(out, "Search: \"{}\"", state.search);
    }
    if let Some(msg) = state.upload_message() {
        let _ = writeln!(out, "{}", msg.text());
    }

    if state.loading {
        let _ = writeln!(out, "Loading items...");
    }
    if let Some(ref error) = state.error {
        let _ = writeln!(out, "❌ {}", error);
    }

    if !state.loading && state.error.is_none() {
        if !state.current_prefix().is_empty() {
            let _ = writeln!(out, "In {}  (← Back to Root: `root`)", state.current_prefix());
        }

        let folders = state.filtered_folders();
        let files = state.filtered_files();

        if !folders.is_empty() {
            let _ = writeln!(out, "📁 Folders");
            for folder in &folders {
                let _ = writeln!(out, "  {}", state.display_name(&folder.prefix));
            }
        }
        if !files.is_empty() {
            let _ = writeln!(out, "📄 Files");
            for file in &files {
                let _ = writeln!(out, "  {}", file_line(state, file));
            }
        }
        if folders.is_empty() && files.is_empty() {
            let _ = writeln!(out, "No files or folders found.");
        }
    }

    if let Some(msg) = state.download_message() {
        let _ = writeln!(out, "{}", msg.text());
    }
    out
}
