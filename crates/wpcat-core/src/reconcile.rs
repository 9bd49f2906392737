//! Reconciliation loop.
//!
//! Drives eligible posts through a [`Classify`] implementation in batches,
//! matches answers back by normalized title and requeues whatever went
//! unanswered until every post is either categorized or given up on.
//!
//! ```text
//! pending ──batch──▶ in-batch ──match──▶ resolved
//!    ▲                   │
//!    └──── requeued ◀────┘ (no match, attempts left)
//!                        └──────────────▶ given up (attempt limit)
//! ```

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, info, warn};

use crate::batch::DEFAULT_BATCH_SIZE;
use crate::category::{AllowedCategories, CategoryAssignment, Classification, Classify};
use crate::config::{FailurePolicy, ReconcileConfig};
use crate::error::{Result, WpcatError};
use crate::normalize::normalize_title;
use crate::wxr::Post;

/// Retry and failure behavior of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilePolicy {
    pub batch_size: usize,
    /// `None` retries forever
    pub max_attempts: Option<u32>,
    pub on_failure: FailurePolicy,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_attempts: None,
            on_failure: FailurePolicy::Requeue,
        }
    }
}

impl From<&ReconcileConfig> for ReconcilePolicy {
    fn from(config: &ReconcileConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            max_attempts: (config.max_attempts > 0).then_some(config.max_attempts),
            on_failure: config.on_failure,
        }
    }
}

/// Progress callbacks. All methods default to doing nothing.
pub trait ReconcileObserver {
    fn batch_started(&mut self, _pass: usize, _titles: usize) {}
    fn post_matched(&mut self, _post: &Post) {}
    fn batch_failed(&mut self, _error: &WpcatError) {}
    fn post_given_up(&mut self, _post: &Post, _attempts: u32) {}
}

/// Observer that ignores every event.
pub struct NoopObserver;

impl ReconcileObserver for NoopObserver {}

/// Outcome of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Classifier calls made, failed ones included
    pub calls: usize,
    pub failed_calls: usize,
    /// Full sweeps over the working set
    pub passes: usize,
    pub resolved: usize,
    /// Ids of posts that hit the attempt limit, in give-up order
    pub given_up: Vec<String>,
    /// Response elements dropped by validation across all calls
    pub discarded_entries: usize,
}

impl ReconcileReport {
    pub fn is_complete(&self) -> bool {
        self.given_up.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    /// Index into the post slice
    index: usize,
    attempts: u32,
    /// Sweep over the working set this entry belongs to
    pass: usize,
}

/// Owns the working set and the seen set for one run.
pub struct Reconciler<'a, C: ?Sized> {
    classifier: &'a C,
    allowed: &'a AllowedCategories,
    policy: ReconcilePolicy,
}

impl<'a, C: Classify + ?Sized> Reconciler<'a, C> {
    pub fn new(classifier: &'a C, allowed: &'a AllowedCategories, policy: ReconcilePolicy) -> Self {
        Self {
            classifier,
            allowed,
            policy,
        }
    }

    /// Categorize every eligible post in place.
    ///
    /// Returns when the working set is empty. With `max_attempts == None` and a
    /// classifier that never answers some title, this does not return.
    pub fn run(
        &self,
        posts: &mut [Post],
        observer: &mut dyn ReconcileObserver,
    ) -> Result<ReconcileReport> {
        let mut run = Run {
            posts,
            allowed: self.allowed,
            policy: self.policy,
            pending: VecDeque::new(),
            seen: HashSet::new(),
            report: ReconcileReport::default(),
        };
        run.pending = run
            .posts
            .iter()
            .enumerate()
            .filter(|(_, post)| post.is_eligible())
            .map(|(index, _)| Pending {
                index,
                attempts: 0,
                pass: 1,
            })
            .collect();

        info!(posts = run.pending.len(), "starting reconciliation");

        loop {
            let batch = run.next_batch(self.policy.batch_size);
            let Some(pass) = batch.iter().map(|p| p.pass).max() else {
                break;
            };
            run.report.passes = run.report.passes.max(pass);

            let titles = unique_titles(&*run.posts, &batch);
            observer.batch_started(pass, titles.len());
            debug!(pass, titles = titles.len(), "classifying batch");

            run.report.calls += 1;
            match self.classifier.classify(&titles, self.allowed) {
                Ok(classification) => {
                    run.report.discarded_entries += classification.discarded;
                    let matched = run.apply(&classification, &batch, observer);
                    let unmatched: Vec<Pending> = batch
                        .into_iter()
                        .filter(|p| !matched.contains(&p.index))
                        .collect();
                    run.requeue(unmatched, observer);
                }
                Err(e)
                    if e.is_batch_local() && self.policy.on_failure == FailurePolicy::Requeue =>
                {
                    warn!(error = %e, "batch failed, requeueing");
                    run.report.failed_calls += 1;
                    observer.batch_failed(&e);
                    run.requeue(batch, observer);
                }
                Err(e) => {
                    run.report.failed_calls += 1;
                    return Err(e);
                }
            }
        }

        info!(
            resolved = run.report.resolved,
            given_up = run.report.given_up.len(),
            calls = run.report.calls,
            "reconciliation finished"
        );
        Ok(run.report)
    }
}

/// Mutable state of one `Reconciler::run`.
struct Run<'p> {
    posts: &'p mut [Post],
    allowed: &'p AllowedCategories,
    policy: ReconcilePolicy,
    /// Working set; unmatched posts go to the back
    pending: VecDeque<Pending>,
    /// Ids of resolved posts
    seen: HashSet<String>,
    report: ReconcileReport,
}

impl Run<'_> {
    /// Up to `size` unresolved entries from the front of the working set.
    fn next_batch(&mut self, size: usize) -> Vec<Pending> {
        let mut batch = Vec::with_capacity(size);
        while batch.len() < size {
            let Some(pending) = self.pending.pop_front() else {
                break;
            };
            if !self.seen.contains(&self.posts[pending.index].id) {
                batch.push(pending);
            }
        }
        batch
    }

    /// Match answers against the batch and everything still in the working
    /// set, requeued posts included.
    ///
    /// Returns the post indices resolved from `batch`.
    fn apply(
        &mut self,
        classification: &Classification,
        batch: &[Pending],
        observer: &mut dyn ReconcileObserver,
    ) -> HashSet<usize> {
        let answers = merge_answers(classification);

        let mut matched = HashSet::new();
        for pending in batch.iter().rev() {
            if self.resolve(pending.index, &answers, observer) {
                matched.insert(pending.index);
            }
        }

        let waiting: Vec<usize> = self.pending.iter().map(|p| p.index).collect();
        for index in waiting.into_iter().rev() {
            self.resolve(index, &answers, observer);
        }
        let seen = &self.seen;
        let posts = &*self.posts;
        self.pending.retain(|p| !seen.contains(&posts[p.index].id));

        matched
    }

    fn resolve(
        &mut self,
        index: usize,
        answers: &HashMap<String, Vec<String>>,
        observer: &mut dyn ReconcileObserver,
    ) -> bool {
        let post = &self.posts[index];
        if self.seen.contains(&post.id) {
            // Resolved earlier under the same id; never append twice
            return true;
        }
        let Some(slugs) = answers.get(&normalize_title(&post.title)) else {
            return false;
        };

        let categories: Vec<CategoryAssignment> = slugs
            .iter()
            .filter(|slug| self.allowed.contains(slug))
            .map(|slug| CategoryAssignment::from_slug(slug))
            .collect();
        if categories.is_empty() {
            return false;
        }

        let post = &mut self.posts[index];
        post.categories.extend(categories);
        self.seen.insert(post.id.clone());
        self.report.resolved += 1;
        observer.post_matched(post);
        true
    }

    fn requeue(&mut self, unmatched: Vec<Pending>, observer: &mut dyn ReconcileObserver) {
        for mut pending in unmatched {
            let post = &self.posts[pending.index];
            if self.seen.contains(&post.id) {
                continue;
            }

            pending.attempts += 1;
            pending.pass += 1;
            match self.policy.max_attempts {
                Some(limit) if pending.attempts >= limit => {
                    warn!(id = %post.id, title = %post.title, attempts = pending.attempts, "giving up");
                    self.report.given_up.push(post.id.clone());
                    observer.post_given_up(post, pending.attempts);
                }
                _ => self.pending.push_back(pending),
            }
        }
    }
}

/// Key answers by normalized title. Titles that collapse to the same key are
/// merged in sorted title order, slugs deduplicated.
fn merge_answers(classification: &Classification) -> HashMap<String, Vec<String>> {
    let mut entries: Vec<(&String, &Vec<String>)> = classification.assignments.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let mut answers: HashMap<String, Vec<String>> = HashMap::new();
    for (title, slugs) in entries {
        let merged = answers.entry(normalize_title(title)).or_default();
        for slug in slugs {
            if !merged.contains(slug) {
                merged.push(slug.clone());
            }
        }
    }
    answers
}

/// Original titles of the batch, first occurrence wins.
fn unique_titles(posts: &[Post], batch: &[Pending]) -> Vec<String> {
    let mut seen = HashSet::new();
    batch
        .iter()
        .map(|p| &posts[p.index].title)
        .filter(|title| seen.insert(title.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wxr::PostKind;
    use std::cell::RefCell;

    fn allowed() -> AllowedCategories {
        AllowedCategories::parse("news,senior-life").unwrap()
    }

    fn make_posts(n: usize) -> Vec<Post> {
        (0..n)
            .map(|i| Post::new(format!("{}", i + 1), format!("Post number {}", i + 1), PostKind::Post))
            .collect()
    }

    /// Answers titles for which `answer(call, position)` is true.
    struct ScriptedClassifier<F> {
        answer: F,
        calls: RefCell<Vec<Vec<String>>>,
    }

    impl<F: Fn(usize, usize) -> bool> ScriptedClassifier<F> {
        fn new(answer: F) -> Self {
            Self {
                answer,
                calls: RefCell::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }
    }

    impl<F: Fn(usize, usize) -> bool> Classify for ScriptedClassifier<F> {
        fn classify(&self, titles: &[String], _: &AllowedCategories) -> Result<Classification> {
            let call = self.calls.borrow().len();
            self.calls.borrow_mut().push(titles.to_vec());
            let mut classification = Classification::default();
            for (position, title) in titles.iter().enumerate() {
                if (self.answer)(call, position) {
                    classification
                        .assignments
                        .insert(title.to_uppercase(), vec!["news".to_string()]);
                }
            }
            Ok(classification)
        }
    }

    struct FailingClassifier {
        failures_left: RefCell<usize>,
    }

    impl Classify for FailingClassifier {
        fn classify(&self, titles: &[String], _: &AllowedCategories) -> Result<Classification> {
            let mut left = self.failures_left.borrow_mut();
            if *left > 0 {
                *left -= 1;
                return Err(WpcatError::MalformedResponse {
                    message: "not valid JSON".to_string(),
                });
            }
            let assignments = titles
                .iter()
                .map(|t| (t.clone(), vec!["senior-life".to_string()]))
                .collect();
            Ok(Classification {
                assignments,
                discarded: 0,
            })
        }
    }

    #[derive(Default)]
    struct Recorder {
        batches: Vec<usize>,
        matched: Vec<String>,
        failures: usize,
        given_up: Vec<(String, u32)>,
    }

    impl ReconcileObserver for Recorder {
        fn batch_started(&mut self, _pass: usize, titles: usize) {
            self.batches.push(titles);
        }
        fn post_matched(&mut self, post: &Post) {
            self.matched.push(post.id.clone());
        }
        fn batch_failed(&mut self, _error: &WpcatError) {
            self.failures += 1;
        }
        fn post_given_up(&mut self, post: &Post, attempts: u32) {
            self.given_up.push((post.id.clone(), attempts));
        }
    }

    #[test]
    fn test_full_answers_take_ceil_n_over_batch_calls() {
        for n in [1, 49, 50, 51, 120] {
            let mut posts = make_posts(n);
            let classifier = ScriptedClassifier::new(|_, _| true);
            let allowed = allowed();
            let reconciler = Reconciler::new(&classifier, &allowed, ReconcilePolicy::default());

            let report = reconciler.run(&mut posts, &mut NoopObserver).unwrap();

            assert_eq!(classifier.call_count(), n.div_ceil(50), "n = {}", n);
            assert_eq!(report.resolved, n);
            assert!(report.is_complete());
            assert!(posts.iter().all(|p| p.categories.len() == 1));
        }
    }

    #[test]
    fn test_half_answers_requeue_until_resolved() {
        let mut posts = make_posts(130);
        let classifier = ScriptedClassifier::new(|_, position| position % 2 == 0);
        let allowed = allowed();
        let reconciler = Reconciler::new(&classifier, &allowed, ReconcilePolicy::default());
        let mut recorder = Recorder::default();

        let report = reconciler.run(&mut posts, &mut recorder).unwrap();

        assert_eq!(report.resolved, 130);
        assert!(posts.iter().all(|p| p.categories.len() == 1));

        let unique: HashSet<&String> = recorder.matched.iter().collect();
        assert_eq!(unique.len(), recorder.matched.len(), "an id was resolved twice");
        assert_eq!(recorder.matched.len(), 130);
        assert!(recorder.batches.iter().all(|&b| b <= 50));
    }

    #[test]
    fn test_requeued_posts_go_to_back() {
        let mut posts = make_posts(3);
        // First call answers only the middle title
        let classifier = ScriptedClassifier::new(|call, position| call > 0 || position == 1);
        let allowed = allowed();
        let reconciler = Reconciler::new(&classifier, &allowed, ReconcilePolicy::default());

        reconciler.run(&mut posts, &mut NoopObserver).unwrap();

        let calls = classifier.calls.borrow();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1], vec!["Post number 1", "Post number 3"]);
    }

    #[test]
    fn test_attempt_limit_gives_up() {
        let mut posts = make_posts(4);
        // Never answers anything
        let classifier = ScriptedClassifier::new(|_, _| false);
        let allowed = allowed();
        let policy = ReconcilePolicy {
            max_attempts: Some(3),
            ..ReconcilePolicy::default()
        };
        let reconciler = Reconciler::new(&classifier, &allowed, policy);
        let mut recorder = Recorder::default();

        let report = reconciler.run(&mut posts, &mut recorder).unwrap();

        assert_eq!(classifier.call_count(), 3);
        assert_eq!(report.given_up, vec!["1", "2", "3", "4"]);
        assert!(recorder.given_up.iter().all(|(_, attempts)| *attempts == 3));
        assert!(posts.iter().all(|p| p.categories.is_empty()));
        assert!(!report.is_complete());
    }

    #[test]
    fn test_malformed_batch_is_requeued() {
        let mut posts = make_posts(60);
        let classifier = FailingClassifier {
            failures_left: RefCell::new(1),
        };
        let allowed = allowed();
        let reconciler = Reconciler::new(&classifier, &allowed, ReconcilePolicy::default());
        let mut recorder = Recorder::default();

        let report = reconciler.run(&mut posts, &mut recorder).unwrap();

        assert_eq!(report.failed_calls, 1);
        assert_eq!(recorder.failures, 1);
        assert_eq!(report.resolved, 60);
        assert_eq!(report.calls, 3);
        assert_eq!(posts[0].categories[0].label, "Senior Life");
    }

    #[test]
    fn test_malformed_batch_aborts_when_configured() {
        let mut posts = make_posts(5);
        let classifier = FailingClassifier {
            failures_left: RefCell::new(1),
        };
        let allowed = allowed();
        let policy = ReconcilePolicy {
            on_failure: FailurePolicy::Abort,
            ..ReconcilePolicy::default()
        };
        let reconciler = Reconciler::new(&classifier, &allowed, policy);

        let result = reconciler.run(&mut posts, &mut NoopObserver);
        assert!(matches!(result, Err(WpcatError::MalformedResponse { .. })));
    }

    #[test]
    fn test_ineligible_posts_untouched() {
        let mut posts = vec![
            Post::new("1", "Hello", PostKind::Post),
            Post::new("2", "logo.png", PostKind::Attachment),
            Post::new("3", "About", PostKind::Page),
        ];
        let classifier = ScriptedClassifier::new(|_, _| true);
        let allowed = allowed();
        let reconciler = Reconciler::new(&classifier, &allowed, ReconcilePolicy::default());

        reconciler.run(&mut posts, &mut NoopObserver).unwrap();

        assert_eq!(classifier.calls.borrow()[0], vec!["Hello"]);
        assert!(posts[0].is_categorized());
        assert!(!posts[1].is_categorized());
        assert!(!posts[2].is_categorized());
    }

    #[test]
    fn test_duplicate_titles_sent_once_and_both_resolved() {
        let mut posts = vec![
            Post::new("1", "Same \u{201C}Title\u{201D}", PostKind::Post),
            Post::new("2", "Same \"Title\"", PostKind::Post),
        ];
        let classifier = ScriptedClassifier::new(|_, _| true);
        let allowed = allowed();
        let reconciler = Reconciler::new(&classifier, &allowed, ReconcilePolicy::default());

        let report = reconciler.run(&mut posts, &mut NoopObserver).unwrap();

        assert_eq!(report.resolved, 2);
        assert_eq!(classifier.call_count(), 1);
        assert!(posts.iter().all(|p| p.categories.len() == 1));
    }

    #[test]
    fn test_answer_for_later_batch_resolves_it_early() {
        let mut posts = make_posts(3);
        let allowed = allowed();
        let policy = ReconcilePolicy {
            batch_size: 1,
            ..ReconcilePolicy::default()
        };

        struct Eager;
        impl Classify for Eager {
            fn classify(&self, titles: &[String], _: &AllowedCategories) -> Result<Classification> {
                let mut classification = Classification::default();
                classification
                    .assignments
                    .insert(titles[0].clone(), vec!["news".to_string()]);
                classification
                    .assignments
                    .insert("post number 3".to_string(), vec!["news".to_string()]);
                Ok(classification)
            }
        }

        let report = Reconciler::new(&Eager, &allowed, policy)
            .run(&mut posts, &mut NoopObserver)
            .unwrap();

        assert_eq!(report.calls, 2);
        assert_eq!(report.resolved, 3);
        assert_eq!(posts[2].categories.len(), 1);
    }

    #[test]
    fn test_requeued_posts_top_up_next_batch() {
        let mut posts = make_posts(60);
        // First call answers nothing, later calls answer everything
        let classifier = ScriptedClassifier::new(|call, _| call > 0);
        let allowed = allowed();
        let reconciler = Reconciler::new(&classifier, &allowed, ReconcilePolicy::default());
        let mut recorder = Recorder::default();

        let report = reconciler.run(&mut posts, &mut recorder).unwrap();

        assert_eq!(recorder.batches, vec![50, 50, 10]);
        let calls = classifier.calls.borrow();
        assert_eq!(calls[1][0], "Post number 51");
        assert_eq!(calls[1][9], "Post number 60");
        assert_eq!(calls[1][10], "Post number 1");
        assert_eq!(calls[1][49], "Post number 40");
        assert_eq!(calls[2][0], "Post number 41");
        assert_eq!(report.resolved, 60);
        assert_eq!(report.passes, 2);
    }

    #[test]
    fn test_colliding_answers_merge_deterministically() {
        struct Colliding;
        impl Classify for Colliding {
            fn classify(&self, _: &[String], _: &AllowedCategories) -> Result<Classification> {
                let mut classification = Classification::default();
                classification
                    .assignments
                    .insert("Town Hall".to_string(), vec!["news".to_string()]);
                classification.assignments.insert(
                    "town  hall".to_string(),
                    vec!["senior-life".to_string(), "news".to_string()],
                );
                Ok(classification)
            }
        }

        let allowed = allowed();
        for _ in 0..20 {
            let mut posts = vec![Post::new("1", "Town Hall", PostKind::Post)];
            Reconciler::new(&Colliding, &allowed, ReconcilePolicy::default())
                .run(&mut posts, &mut NoopObserver)
                .unwrap();

            let slugs: Vec<&str> = posts[0].categories.iter().map(|c| c.slug.as_str()).collect();
            assert_eq!(slugs, vec!["news", "senior-life"]);
        }
    }

    #[test]
    fn test_answer_resolves_requeued_post_once() {
        /// Answers the listed titles on each call, nothing once the script runs out.
        struct Script {
            answers: Vec<Vec<&'static str>>,
            calls: RefCell<Vec<Vec<String>>>,
        }
        impl Classify for Script {
            fn classify(&self, titles: &[String], _: &AllowedCategories) -> Result<Classification> {
                let call = self.calls.borrow().len();
                self.calls.borrow_mut().push(titles.to_vec());
                let mut classification = Classification::default();
                for title in self.answers.get(call).into_iter().flatten() {
                    classification
                        .assignments
                        .insert(title.to_string(), vec!["news".to_string()]);
                }
                Ok(classification)
            }
        }

        let mut posts = make_posts(4);
        let classifier = Script {
            answers: vec![
                vec![],
                vec!["Post number 3", "Post number 4", "Post number 1"],
                vec!["Post number 2"],
            ],
            calls: RefCell::new(Vec::new()),
        };
        let allowed = allowed();
        let policy = ReconcilePolicy {
            batch_size: 2,
            ..ReconcilePolicy::default()
        };
        let mut recorder = Recorder::default();

        let report = Reconciler::new(&classifier, &allowed, policy)
            .run(&mut posts, &mut recorder)
            .unwrap();

        let calls = classifier.calls.borrow();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2], vec!["Post number 2"]);
        assert!(calls[1..]
            .iter()
            .all(|titles| !titles.contains(&"Post number 1".to_string())));
        assert_eq!(recorder.matched.iter().filter(|id| *id == "1").count(), 1);
        assert_eq!(posts[0].categories.len(), 1);
        assert_eq!(report.resolved, 4);
    }

    #[test]
    fn test_policy_from_config() {
        let config = ReconcileConfig {
            batch_size: 10,
            max_attempts: 0,
            on_failure: FailurePolicy::Abort,
        };
        let policy = ReconcilePolicy::from(&config);
        assert_eq!(policy.batch_size, 10);
        assert_eq!(policy.max_attempts, None);
        assert_eq!(policy.on_failure, FailurePolicy::Abort);
    }
}
