// Copyright 2024 Oxide Computer Company

//! In-progress multi-step responses, keyed by resource path

use crate::responder::ResponseSequence;
use std::collections::HashMap;
use std::sync::Mutex;

const PAGE_SUFFIX: &str = "/fake/page/";
const STATUS_SUFFIX: &str = "/fake/status";

/// Strips the suffix that next links and poll locations add to a resource
/// path, so that every request in a sequence maps to the same key.
pub fn sanitize_path(path: &str) -> &str {
    if let Some(base) = path.strip_suffix(STATUS_SUFFIX) {
        return base;
    }
    if let Some(index) = path.rfind(PAGE_SUFFIX) {
        let page = &path[index + PAGE_SUFFIX.len()..];
        if !page.is_empty() && page.bytes().all(|b| b.is_ascii_digit()) {
            return &path[..index];
        }
    }
    path
}

/// The sequences being served for one operation.
///
/// The lock is only held to take or return an entry, never while a step is
/// rendered or a handler runs.
#[derive(Debug, Default)]
pub(crate) struct Tracker {
    sequences: Mutex<HashMap<String, Box<dyn ResponseSequence>>>,
}

impl Tracker {
    /// Removes and returns the sequence for `path`, if there is one.
    pub(crate) fn take(&self, path: &str) -> Option<Box<dyn ResponseSequence>> {
        let mut sequences =
            self.sequences.lock().unwrap_or_else(|e| e.into_inner());
        sequences.remove(sanitize_path(path))
    }

    pub(crate) fn insert(
        &self,
        path: &str,
        sequence: Box<dyn ResponseSequence>,
    ) {
        let mut sequences =
            self.sequences.lock().unwrap_or_else(|e| e.into_inner());
        sequences.insert(sanitize_path(path).to_string(), sequence);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.sequences.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod test {
    use super::sanitize_path;
    use super::Tracker;
    use crate::responder::PagerResponder;
    use http::StatusCode;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(sanitize_path("/widgets"), "/widgets");
        assert_eq!(sanitize_path("/widgets/fake/page/2"), "/widgets");
        assert_eq!(sanitize_path("/widgets/fake/page/12"), "/widgets");
        assert_eq!(sanitize_path("/widgets/w1/fake/status"), "/widgets/w1");
        assert_eq!(
            sanitize_path("/widgets/fake/page/next"),
            "/widgets/fake/page/next"
        );
        assert_eq!(sanitize_path("/widgets/fake/page/"), "/widgets/fake/page/");
    }

    #[test]
    fn test_tracker_keys() {
        let tracker = Tracker::default();
        let pager = PagerResponder::new().add_page(StatusCode::OK, 1u32);
        tracker.insert("/widgets", Box::new(pager));
        assert_eq!(tracker.len(), 1);
        assert!(tracker.take("/gadgets").is_none());
        assert!(tracker.take("/widgets/fake/page/2").is_some());
        assert_eq!(tracker.len(), 0);
        assert!(tracker.take("/widgets").is_none());
    }
}
