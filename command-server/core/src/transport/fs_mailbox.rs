//! Filesystem Mailbox
//!
//! The real transport: `request.json` and `response.json` inside the
//! communication directory. The only concurrency primitive is the atomicity
//! of create-exclusive file creation, which holds across processes on a
//! local filesystem. There is no lock file and no advisory locking.

use std::io::ErrorKind;
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::resolver::CommunicationDir;
use super::traits::{Mailbox, ResponseSlot, TransportError};

/// Mode for the response file
#[cfg(unix)]
const RESPONSE_FILE_MODE: u32 = 0o600;

/// Mailbox backed by the two files in a communication directory
#[derive(Clone, Debug)]
pub struct FsMailbox {
    dir: CommunicationDir,
}

impl FsMailbox {
    /// Create a mailbox over an already validated directory
    pub fn new(dir: CommunicationDir) -> Self {
        Self { dir }
    }

    /// The communication directory
    #[must_use]
    pub fn dir(&self) -> &CommunicationDir {
        &self.dir
    }
}

#[async_trait]
impl Mailbox for FsMailbox {
    async fn request_modified(&self) -> Result<SystemTime, TransportError> {
        let metadata = fs::metadata(self.dir.request_path()).await?;
        Ok(metadata.modified()?)
    }

    async fn read_request(&self) -> Result<Vec<u8>, TransportError> {
        Ok(fs::read(self.dir.request_path()).await?)
    }

    async fn claim_response_slot(&self) -> Result<Box<dyn ResponseSlot>, TransportError> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(RESPONSE_FILE_MODE);

        match options.open(self.dir.response_path()).await {
            Ok(file) => Ok(Box::new(FsResponseSlot { file })),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(TransportError::SlotTaken),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_request(&self, bytes: &[u8]) -> Result<(), TransportError> {
        fs::write(self.dir.request_path(), bytes).await?;
        Ok(())
    }

    async fn read_response(&self) -> Result<Option<Vec<u8>>, TransportError> {
        match fs::read(self.dir.response_path()).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_response(&self) -> Result<(), TransportError> {
        match fs::remove_file(self.dir.response_path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Open handle on a freshly created response file
struct FsResponseSlot {
    file: File,
}

#[async_trait]
impl ResponseSlot for FsResponseSlot {
    async fn commit(self: Box<Self>, bytes: &[u8]) -> Result<(), TransportError> {
        let mut file = self.file;
        file.write_all(bytes).await?;
        file.flush().await?;
        Ok(())
    }

    async fn abandon(self: Box<Self>) -> Result<(), TransportError> {
        let mut file = self.file;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mailbox(temp: &TempDir) -> FsMailbox {
        FsMailbox::new(CommunicationDir::new(temp.path()))
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let temp = TempDir::new().unwrap();
        let mailbox = mailbox(&temp);

        let slot = mailbox.claim_response_slot().await.unwrap();
        let second = mailbox.claim_response_slot().await;
        assert!(matches!(second, Err(TransportError::SlotTaken)));

        slot.commit(b"{}\n").await.unwrap();
        assert!(matches!(
            mailbox.claim_response_slot().await,
            Err(TransportError::SlotTaken)
        ));
    }

    #[tokio::test]
    async fn test_commit_writes_bytes() {
        let temp = TempDir::new().unwrap();
        let mailbox = mailbox(&temp);

        let slot = mailbox.claim_response_slot().await.unwrap();
        slot.commit(b"{\"uuid\":\"a\"}\n").await.unwrap();

        let bytes = std::fs::read(temp.path().join("response.json")).unwrap();
        assert_eq!(bytes, b"{\"uuid\":\"a\"}\n");
    }

    #[tokio::test]
    async fn test_abandon_leaves_empty_file() {
        let temp = TempDir::new().unwrap();
        let mailbox = mailbox(&temp);

        let slot = mailbox.claim_response_slot().await.unwrap();
        slot.abandon().await.unwrap();

        assert_eq!(mailbox.read_response().await.unwrap(), Some(Vec::new()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_response_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let mailbox = mailbox(&temp);
        mailbox
            .claim_response_slot()
            .await
            .unwrap()
            .abandon()
            .await
            .unwrap();

        let mode = std::fs::metadata(temp.path().join("response.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o077, 0);
    }

    #[tokio::test]
    async fn test_client_side_operations() {
        let temp = TempDir::new().unwrap();
        let mailbox = mailbox(&temp);

        assert_eq!(mailbox.read_response().await.unwrap(), None);
        mailbox.remove_response().await.unwrap();

        mailbox.write_request(b"{}").await.unwrap();
        assert_eq!(mailbox.read_request().await.unwrap(), b"{}");
        assert!(mailbox.request_modified().await.is_ok());

        std::fs::write(temp.path().join("response.json"), b"x").unwrap();
        mailbox.remove_response().await.unwrap();
        assert!(!temp.path().join("response.json").exists());
    }

    #[tokio::test]
    async fn test_missing_request() {
        let temp = TempDir::new().unwrap();
        let result = mailbox(&temp).request_modified().await;
        assert!(matches!(result, Err(TransportError::Io(_))));
    }
}
