//! Read-through comment index.
//!
//! The first `list` for a post loads its thread from storage and keeps it for
//! the process lifetime, empty threads included. Appends insert into the
//! cached thread by creation time and skip comments the thread already holds. One lock covers every post, and the lazy load runs under
//! it, so an append can never overtake the first load of the same thread.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::application::repos::CommentsRepo;
use crate::domain::entities::CommentRecord;

const SOURCE: &str = "cache::comments";

type Thread = Arc<Vec<CommentRecord>>;

pub struct CommentIndex {
    repo: Arc<dyn CommentsRepo>,
    threads: Mutex<HashMap<i32, Thread>>,
}

impl CommentIndex {
    pub fn new(repo: Arc<dyn CommentsRepo>) -> Self {
        Self {
            repo,
            threads: Mutex::new(HashMap::new()),
        }
    }

    /// Comments on `post_id`, oldest first. A storage failure yields an empty
    /// thread and leaves the entry absent so the next call retries.
    pub async fn list(&self, post_id: i32) -> Thread {
        let mut threads = self.threads.lock().await;
        self.load_locked(&mut threads, post_id)
            .await
            .unwrap_or_default()
    }

    /// Append a committed comment to its thread, loading the thread first if
    /// it has never been read. A load that already returned the row leaves the
    /// thread as loaded.
    ///
    /// When that load fails the comment is not cached on its own: the thread
    /// stays absent and the next successful load picks the row up from
    /// storage.
    pub async fn append(&self, comment: CommentRecord) {
        let mut threads = self.threads.lock().await;
        if self.load_locked(&mut threads, comment.post_id).await.is_none() {
            return;
        }

        if let Some(thread) = threads.get_mut(&comment.post_id) {
            if thread.iter().any(|existing| existing.id == comment.id) {
                return;
            }
            let at = thread.partition_point(|existing| existing.created_at <= comment.created_at);
            Arc::make_mut(thread).insert(at, comment);
        }
    }

    /// Number of posts whose threads are cached.
    pub async fn cached_threads(&self) -> usize {
        self.threads.lock().await.len()
    }

    async fn load_locked(
        &self,
        threads: &mut HashMap<i32, Thread>,
        post_id: i32,
    ) -> Option<Thread> {
        if let Some(thread) = threads.get(&post_id) {
            counter!("pixfeed_comment_index_hit_total").increment(1);
            return Some(Arc::clone(thread));
        }

        counter!("pixfeed_comment_index_miss_total").increment(1);
        match self.repo.comments_for_post(post_id).await {
            Ok(comments) => {
                debug!(
                    target = SOURCE,
                    post_id,
                    comments = comments.len(),
                    "comment thread loaded"
                );
                let thread = Arc::new(comments);
                threads.insert(post_id, Arc::clone(&thread));
                Some(thread)
            }
            Err(err) => {
                error!(
                    target = SOURCE,
                    post_id,
                    error = %err,
                    "failed to load comment thread"
                );
                None
            }
        }
    }
}
