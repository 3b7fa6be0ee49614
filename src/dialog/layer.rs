use std::collections::HashMap;
use std::sync::Mutex;

use super::{Dialog, DialogId};
use crate::transport::{IncomingRequest, IncomingResponse};

/// The dialog directory, keyed by (Call-ID, local tag, remote tag).
///
/// Removal is explicit; the layer does not garbage-collect dialogs
/// whose transactions have terminated.
#[derive(Default)]
pub struct DialogLayer {
    dialogs: Mutex<HashMap<DialogId, Dialog>>,
}

impl DialogLayer {
    /// Registers a dialog under its current identifier.
    pub fn insert(&self, dialog: Dialog) {
        let mut map = self.dialogs.lock().expect("Lock failed");
        map.insert(dialog.id(), dialog);
    }

    /// Removes a dialog.
    pub fn remove(&self, id: &DialogId) -> Option<Dialog> {
        let mut map = self.dialogs.lock().expect("Lock failed");
        map.remove(id)
    }

    /// Moves a dialog from its old key to its current one, after the
    /// remote tag was learned.
    pub(crate) fn rekey(&self, old_id: &DialogId, dialog: Dialog) {
        let mut map = self.dialogs.lock().expect("Lock failed");
        map.remove(old_id);
        map.insert(dialog.id(), dialog);
    }

    /// Looks a dialog up by identifier.
    ///
    /// An exact triple match wins; a key whose remote tag has not been
    /// learned yet still finds the dialog via (Call-ID, local tag),
    /// so transactions created before the first tagged response keep
    /// reaching their dialog.
    pub fn find(&self, id: &DialogId) -> Option<Dialog> {
        let map = self.dialogs.lock().expect("Lock failed");

        if let Some(dialog) = map.get(id) {
            return Some(dialog.clone());
        }

        map.values()
            .find(|dialog| {
                let current = dialog.id();
                current.call_id == id.call_id
                    && current.local_tag == id.local_tag
                    && (current.remote_tag.is_none() || id.remote_tag.is_none())
            })
            .cloned()
    }

    /// Matches an inbound request to a dialog per RFC 3261 §12.2.2:
    /// the request's To tag names our local tag.
    pub fn match_request(&self, request: &IncomingRequest) -> Option<Dialog> {
        let id = DialogId::from_incoming_request(request)?;
        self.find(&id)
    }

    /// Matches an inbound response to a dialog: the response's From
    /// tag names our local tag.
    pub fn match_response(&self, response: &IncomingResponse) -> Option<Dialog> {
        let id = DialogId::from_incoming_response(response)?;
        self.find(&id)
    }

    /// Number of live dialogs.
    pub fn len(&self) -> usize {
        self.dialogs.lock().expect("Lock failed").len()
    }

    /// Returns `true` when no dialog is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Announces shutdown to every live dialog.
    pub fn shutdown_all(&self) {
        let map = self.dialogs.lock().expect("Lock failed");
        for dialog in map.values() {
            dialog.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::tests::ims_endpoint;
    use crate::dialog::OperationProfile;

    #[tokio::test]
    async fn test_insert_find_remove() {
        let endpoint = ims_endpoint().await;
        let dialog = Dialog::new_uac(&endpoint, None, OperationProfile::default());

        let layer = endpoint.dialogs();
        assert_eq!(layer.len(), 1);

        let found = layer.find(&dialog.id()).unwrap();
        assert_eq!(found.id(), dialog.id());

        dialog.remove();
        assert!(layer.is_empty());
    }

    #[tokio::test]
    async fn test_find_without_remote_tag() {
        let endpoint = ims_endpoint().await;
        let dialog = Dialog::new_uac(&endpoint, None, OperationProfile::default());

        // A key with a remote tag the dialog has not learned yet still
        // resolves via the half-open match.
        let mut id = dialog.id();
        id.remote_tag = Some("peer1".into());

        assert!(endpoint.dialogs().find(&id).is_some());
    }
}
