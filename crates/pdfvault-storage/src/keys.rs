//! Shared key generation for storage backends.
//!
//! Final artifacts live under `pdfs/`, chunk staging under
//! `chunks/{upload_session_id}/`. All components must derive keys through
//! these helpers so backends and cleanup agree on the layout.

use uuid::Uuid;

/// Key of the final artifact for a stored file.
pub fn final_key(file_id: Uuid) -> String {
    format!("pdfs/{}.pdf", file_id)
}

/// Staging key for one chunk of an upload session.
pub fn chunk_key(upload_session_id: Uuid, chunk_number: i32) -> String {
    format!("chunks/{}/chunk_{}", upload_session_id, chunk_number)
}

/// Prefix covering a session's whole chunk working area.
pub fn session_prefix(upload_session_id: Uuid) -> String {
    format!("chunks/{}/", upload_session_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        let file_id = Uuid::nil();
        assert_eq!(
            final_key(file_id),
            "pdfs/00000000-0000-0000-0000-000000000000.pdf"
        );

        let session = Uuid::nil();
        assert_eq!(
            chunk_key(session, 3),
            "chunks/00000000-0000-0000-0000-000000000000/chunk_3"
        );
        assert!(chunk_key(session, 3).starts_with(&session_prefix(session)));
    }
}
