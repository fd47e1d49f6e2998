//! File extension filter.

use crate::adapters::ChatMessage;
use crate::domain::FileCandidate;

/// Return the first enabled extension that `filename` ends with.
///
/// Comparison is case-insensitive on the whole filename string.
pub fn match_extension<S: AsRef<str>>(filename: &str, enabled: &[S]) -> Option<String> {
    let lower = filename.to_lowercase();
    enabled
        .iter()
        .map(|ext| ext.as_ref())
        .find(|ext| !ext.is_empty() && lower.ends_with(&ext.to_lowercase()))
        .map(|ext| ext.to_string())
}

/// Build a file candidate from a message if its attachment matches
pub fn file_candidate<S: AsRef<str>>(message: &ChatMessage, enabled: &[S]) -> Option<FileCandidate> {
    let file = message.file.as_ref()?;
    let filename = file.file_name.as_deref()?;
    let extension = match_extension(filename, enabled)?;

    Some(FileCandidate {
        filename: filename.to_string(),
        extension,
        size: file.size,
        chat_id: message.chat_id,
        message_id: message.id,
    })
}
