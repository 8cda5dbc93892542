//! Where a visitor's [`CaptionSession`] lives.
//!
//! The session record only carries a visitor id. The state itself sits in a
//! [`VisitorStore`] and is changed under its lock, so a request that saves an
//! older copy of the session record cannot roll the state back.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::distr::{Alphanumeric, SampleString};
use tokio::sync::Mutex;
use tower_sessions::Session;

use crate::error::CaptionAiError;
use crate::ui::CaptionSession;

const VISITOR_ID_KEY: &str = "visitor_id";
const VISITOR_ID_LENGTH: usize = 32;

#[derive(Debug)]
struct VisitorEntry {
    caption_session: CaptionSession,
    last_seen: Instant,
}

/// Every visitor's caption state, keyed by visitor id.
#[derive(Clone, Debug)]
pub(crate) struct VisitorStore {
    visitors: Arc<Mutex<HashMap<String, VisitorEntry>>>,
    idle: Duration,
}

impl VisitorStore {
    /// Visitors untouched for `idle` are dropped by [`Self::evict_idle`].
    pub(crate) fn new(idle: Duration) -> Self {
        Self {
            visitors: Arc::new(Mutex::new(HashMap::new())),
            idle,
        }
    }

    /// Looks at the visitor's state; unknown visitors read as a fresh Idle one.
    pub(crate) async fn read<R>(
        &self,
        visitor: &str,
        view: impl FnOnce(&CaptionSession) -> R,
    ) -> R {
        let mut visitors = self.visitors.lock().await;
        match visitors.get_mut(visitor) {
            Some(entry) => {
                entry.last_seen = Instant::now();
                view(&entry.caption_session)
            }
            None => view(&CaptionSession::default()),
        }
    }

    /// Runs one transition against the visitor's state.
    pub(crate) async fn update<R>(
        &self,
        visitor: &str,
        transition: impl FnOnce(&mut CaptionSession) -> R,
    ) -> R {
        let mut visitors = self.visitors.lock().await;
        let entry = visitors
            .entry(visitor.to_string())
            .or_insert_with(|| VisitorEntry {
                caption_session: CaptionSession::default(),
                last_seen: Instant::now(),
            });
        entry.last_seen = Instant::now();
        transition(&mut entry.caption_session)
    }

    /// Drops visitors idle since before `now - idle`. Returns how many went.
    pub(crate) async fn evict_idle(&self, now: Instant) -> usize {
        let mut visitors = self.visitors.lock().await;
        let before = visitors.len();
        visitors.retain(|_, entry| now.saturating_duration_since(entry.last_seen) < self.idle);
        before - visitors.len()
    }

    #[cfg(test)]
    pub(crate) async fn visitor_count(&self) -> usize {
        self.visitors.lock().await.len()
    }
}

/// The session's visitor id, minted on first use.
pub(crate) async fn visitor_id(session: &Session) -> Result<String, CaptionAiError> {
    if let Some(existing) = session.get::<String>(VISITOR_ID_KEY).await? {
        return Ok(existing);
    }
    let id = Alphanumeric.sample_string(&mut rand::rng(), VISITOR_ID_LENGTH);
    session.insert(VISITOR_ID_KEY, id.clone()).await?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::caption::payload::tests::sample_png;
    use crate::caption::{CaptionResult, ImagePayload};
    use crate::ui::{FileRead, Notice, UiState};
    use crate::web::flash::set_notice;
    use crate::web::store::SessionRecords;

    fn selected(caption_session: &mut CaptionSession) {
        let payload = ImagePayload::from_bytes(&sample_png()).expect("payload");
        caption_session
            .file_read(FileRead::Ready(payload))
            .expect("select");
    }

    #[tokio::test]
    async fn visitor_id_is_stable_within_a_session() {
        let records = Arc::new(SessionRecords::default());
        let session = Session::new(None, records.clone(), None);
        let first = visitor_id(&session).await.expect("mint");
        session.save().await.expect("save");

        let again = Session::new(session.id(), records, None);
        assert_eq!(visitor_id(&again).await.expect("load"), first);
        assert_eq!(first.len(), VISITOR_ID_LENGTH);
    }

    #[tokio::test]
    async fn unknown_visitor_reads_idle_without_being_stored() {
        let visitors = VisitorStore::new(Duration::from_secs(60));
        let state = visitors.read("nobody", |s| s.state().clone()).await;
        assert_eq!(state, UiState::Idle);
        assert_eq!(visitors.visitor_count().await, 0);
    }

    #[tokio::test]
    async fn stale_session_save_cannot_undo_a_settled_generation() {
        let records = Arc::new(SessionRecords::default());
        let visitors = VisitorStore::new(Duration::from_secs(60));

        let browser = Session::new(None, records.clone(), None);
        let id = visitor_id(&browser).await.expect("mint");
        browser.save().await.expect("save");
        visitors
            .update(&id, |s| {
                selected(s);
                s.begin_generate().map(|_| ())
            })
            .await
            .expect("begin");

        // A concurrent request loads the record while the generation runs.
        let other = Session::new(browser.id(), records.clone(), None);
        let other_id = visitor_id(&other).await.expect("load");
        assert!(visitors.read(&other_id, |s| s.is_loading()).await);

        // The generation settles first.
        let settled = visitors
            .update(&id, |s| {
                s.complete_generate::<()>(Ok(CaptionResult {
                    caption: "Sunset vibes".to_string(),
                    hashtags: vec!["#sunset".to_string()],
                }))
            })
            .await;
        assert!(settled.is_ok());

        // Then the other request writes its older copy of the record back.
        set_notice(&other, &Notice::GenerationInProgress)
            .await
            .expect("notice");
        other.save().await.expect("stale save");

        let reloaded = Session::new(browser.id(), records, None);
        let id = visitor_id(&reloaded).await.expect("reload");
        let caption = visitors
            .read(&id, |s| s.result().map(|result| result.caption.clone()))
            .await;
        assert_eq!(caption.as_deref(), Some("Sunset vibes"));
        assert!(visitors.update(&id, |s| s.begin_generate()).await.is_ok());
    }

    #[tokio::test]
    async fn idle_visitors_are_evicted() {
        let idle = Duration::from_secs(60);
        let visitors = VisitorStore::new(idle);
        visitors.update("first", selected).await;
        visitors.update("second", selected).await;

        assert_eq!(visitors.evict_idle(Instant::now()).await, 0);
        assert_eq!(visitors.visitor_count().await, 2);

        let later = Instant::now() + idle + Duration::from_secs(1);
        assert_eq!(visitors.evict_idle(later).await, 2);
        assert_eq!(visitors.visitor_count().await, 0);
        assert!(visitors.read("first", |s| s.image().is_none()).await);
    }
}
