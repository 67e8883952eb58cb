//! In-memory account and content store.
//!
//! `SharedStore` is the process-wide handle injected into handlers: a cheap
//! clone over `Arc<RwLock<..>>`. Durable state for authentication (accounts)
//! and the blog content (posts, comments, follows) lives here; issued tokens
//! live in the token service.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::{AppError, AppResult};
use crate::identity::Role;
use crate::{markdown, security};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: u64,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub confirmed: bool,
    pub role: Role,
    pub name: Option<String>,
    pub location: Option<String>,
    pub about_me: Option<String>,
    pub member_since: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: u64,
    pub author_id: u64,
    pub body: String,
    pub body_html: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: u64,
    pub post_id: u64,
    pub author_id: u64,
    pub body: String,
    pub body_html: String,
    pub timestamp: DateTime<Utc>,
    pub disabled: bool,
}

#[derive(Debug, Default)]
struct Store {
    users: BTreeMap<u64, User>,
    posts: BTreeMap<u64, Post>,
    comments: BTreeMap<u64, Comment>,
    /// (follower, followed) pairs. Users follow themselves on registration so
    /// their own posts appear in their timeline.
    follows: HashSet<(u64, u64)>,
    next_user_id: u64,
    next_post_id: u64,
    next_comment_id: u64,
    admin_email: Option<String>,
}

/// Shared handle over the store. Clone freely; all clones see the same data.
#[derive(Clone)]
pub struct SharedStore(Arc<RwLock<Store>>);

/// Slice out one page (1-based) of an ordered item list, returning the page
/// and the total count before slicing.
pub fn paginate<T: Clone>(items: &[T], page: usize, per_page: usize) -> (Vec<T>, usize) {
    let total = items.len();
    let page = page.max(1);
    let start = (page - 1).saturating_mul(per_page);
    let slice = if start >= total {
        Vec::new()
    } else {
        items[start..(start + per_page).min(total)].to_vec()
    };
    (slice, total)
}

impl SharedStore {
    pub fn new(admin_email: Option<String>) -> Self {
        let store = Store {
            next_user_id: 1,
            next_post_id: 1,
            next_comment_id: 1,
            admin_email,
            ..Store::default()
        };
        SharedStore(Arc::new(RwLock::new(store)))
    }

    // ---- accounts ----

    /// Register a new account. The password is hashed before storage; the
    /// first account registering with the configured admin email gets the
    /// administrator role. New users follow themselves.
    pub fn register(&self, email: &str, username: &str, password: &str) -> AppResult<User> {
        let password_hash = security::hash_password(password)
            .map_err(|e| AppError::internal("hash_failed".to_string(), e.to_string()))?;
        let mut s = self.0.write();
        if s.users.values().any(|u| u.email.eq_ignore_ascii_case(email)) {
            return Err(AppError::conflict("duplicate_email", "email already registered"));
        }
        if s.users.values().any(|u| u.username == username) {
            return Err(AppError::conflict("duplicate_username", "username already in use"));
        }
        let role = match &s.admin_email {
            Some(admin) if admin.eq_ignore_ascii_case(email) => Role::Administrator,
            _ => Role::User,
        };
        let id = s.next_user_id;
        s.next_user_id += 1;
        let now = Utc::now();
        let user = User {
            id,
            email: email.to_string(),
            username: username.to_string(),
            password_hash,
            confirmed: false,
            role,
            name: None,
            location: None,
            about_me: None,
            member_since: now,
            last_seen: now,
        };
        s.users.insert(id, user.clone());
        s.follows.insert((id, id));
        tracing::info!(user_id = id, username, "account registered");
        Ok(user)
    }

    pub fn user(&self, id: u64) -> Option<User> {
        self.0.read().users.get(&id).cloned()
    }

    /// Account lookup for the password path: the identifier may be either the
    /// registered email (case-insensitive) or the exact username.
    pub fn find_by_identifier(&self, identifier: &str) -> Option<User> {
        let s = self.0.read();
        s.users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(identifier) || u.username == identifier)
            .cloned()
    }

    pub fn email_taken_by_other(&self, email: &str, user_id: u64) -> bool {
        let s = self.0.read();
        s.users
            .values()
            .any(|u| u.id != user_id && u.email.eq_ignore_ascii_case(email))
    }

    pub fn username_taken_by_other(&self, username: &str, user_id: u64) -> bool {
        let s = self.0.read();
        s.users.values().any(|u| u.id != user_id && u.username == username)
    }

    pub fn set_confirmed(&self, id: u64, confirmed: bool) -> AppResult<()> {
        let mut s = self.0.write();
        let user = s
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("no_user", "user not found"))?;
        user.confirmed = confirmed;
        Ok(())
    }

    pub fn touch_last_seen(&self, id: u64) {
        if let Some(u) = self.0.write().users.get_mut(&id) {
            u.last_seen = Utc::now();
        }
    }

    /// Self-service profile edit: only the descriptive fields.
    pub fn update_profile(
        &self,
        id: u64,
        name: Option<String>,
        location: Option<String>,
        about_me: Option<String>,
    ) -> AppResult<User> {
        let mut s = self.0.write();
        let user = s
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("no_user", "user not found"))?;
        if let Some(v) = name {
            user.name = Some(v);
        }
        if let Some(v) = location {
            user.location = Some(v);
        }
        if let Some(v) = about_me {
            user.about_me = Some(v);
        }
        Ok(user.clone())
    }

    /// Administrator profile edit: identity fields included. Duplicate checks
    /// are the caller's responsibility (see `forms`).
    #[allow(clippy::too_many_arguments)]
    pub fn admin_update(
        &self,
        id: u64,
        email: Option<String>,
        username: Option<String>,
        confirmed: Option<bool>,
        role: Option<Role>,
        name: Option<String>,
        location: Option<String>,
        about_me: Option<String>,
    ) -> AppResult<User> {
        let mut s = self.0.write();
        let user = s
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("no_user", "user not found"))?;
        if let Some(v) = email {
            user.email = v;
        }
        if let Some(v) = username {
            user.username = v;
        }
        if let Some(v) = confirmed {
            user.confirmed = v;
        }
        if let Some(v) = role {
            user.role = v;
        }
        if let Some(v) = name {
            user.name = Some(v);
        }
        if let Some(v) = location {
            user.location = Some(v);
        }
        if let Some(v) = about_me {
            user.about_me = Some(v);
        }
        Ok(user.clone())
    }

    pub fn user_post_count(&self, id: u64) -> usize {
        self.0.read().posts.values().filter(|p| p.author_id == id).count()
    }

    // ---- posts ----

    pub fn create_post(&self, author_id: u64, body: &str) -> AppResult<Post> {
        let mut s = self.0.write();
        if !s.users.contains_key(&author_id) {
            return Err(AppError::not_found("no_user", "user not found"));
        }
        let id = s.next_post_id;
        s.next_post_id += 1;
        let post = Post {
            id,
            author_id,
            body: body.to_string(),
            body_html: markdown::render(body),
            timestamp: Utc::now(),
        };
        s.posts.insert(id, post.clone());
        Ok(post)
    }

    pub fn post(&self, id: u64) -> Option<Post> {
        self.0.read().posts.get(&id).cloned()
    }

    /// Replace a post body, re-rendering the HTML projection.
    pub fn update_post(&self, id: u64, body: &str) -> AppResult<Post> {
        let mut s = self.0.write();
        let post = s
            .posts
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("no_post", "post not found"))?;
        post.body = body.to_string();
        post.body_html = markdown::render(body);
        Ok(post.clone())
    }

    /// All posts, newest first, one page at a time.
    pub fn posts_page(&self, page: usize, per_page: usize) -> (Vec<Post>, usize) {
        let s = self.0.read();
        let mut all: Vec<Post> = s.posts.values().cloned().collect();
        all.reverse();
        paginate(&all, page, per_page)
    }

    pub fn posts_by_user(&self, user_id: u64, page: usize, per_page: usize) -> (Vec<Post>, usize) {
        let s = self.0.read();
        let mut own: Vec<Post> =
            s.posts.values().filter(|p| p.author_id == user_id).cloned().collect();
        own.reverse();
        paginate(&own, page, per_page)
    }

    /// Posts authored by anyone the user follows (the user included, via the
    /// registration self-follow), newest first.
    pub fn followed_posts(&self, user_id: u64, page: usize, per_page: usize) -> (Vec<Post>, usize) {
        let s = self.0.read();
        let followed: HashSet<u64> = s
            .follows
            .iter()
            .filter(|(follower, _)| *follower == user_id)
            .map(|(_, followed)| *followed)
            .collect();
        let mut timeline: Vec<Post> = s
            .posts
            .values()
            .filter(|p| followed.contains(&p.author_id))
            .cloned()
            .collect();
        timeline.reverse();
        paginate(&timeline, page, per_page)
    }

    // ---- follows ----

    pub fn follow(&self, follower: u64, followed: u64) -> AppResult<()> {
        let mut s = self.0.write();
        if !s.users.contains_key(&follower) || !s.users.contains_key(&followed) {
            return Err(AppError::not_found("no_user", "user not found"));
        }
        s.follows.insert((follower, followed));
        Ok(())
    }

    pub fn unfollow(&self, follower: u64, followed: u64) -> AppResult<()> {
        let mut s = self.0.write();
        if !s.users.contains_key(&followed) {
            return Err(AppError::not_found("no_user", "user not found"));
        }
        s.follows.remove(&(follower, followed));
        Ok(())
    }

    pub fn is_following(&self, follower: u64, followed: u64) -> bool {
        self.0.read().follows.contains(&(follower, followed))
    }

    // ---- comments ----

    pub fn add_comment(&self, post_id: u64, author_id: u64, body: &str) -> AppResult<Comment> {
        let mut s = self.0.write();
        if !s.posts.contains_key(&post_id) {
            return Err(AppError::not_found("no_post", "post not found"));
        }
        let id = s.next_comment_id;
        s.next_comment_id += 1;
        let comment = Comment {
            id,
            post_id,
            author_id,
            body: body.to_string(),
            body_html: markdown::render(body),
            timestamp: Utc::now(),
            disabled: false,
        };
        s.comments.insert(id, comment.clone());
        Ok(comment)
    }

    pub fn comment(&self, id: u64) -> Option<Comment> {
        self.0.read().comments.get(&id).cloned()
    }

    /// Moderation switch: a disabled comment stays stored but is flagged so
    /// clients can suppress its body.
    pub fn set_comment_disabled(&self, id: u64, disabled: bool) -> AppResult<Comment> {
        let mut s = self.0.write();
        let comment = s
            .comments
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("no_comment", "comment not found"))?;
        comment.disabled = disabled;
        Ok(comment.clone())
    }

    /// Comments on one post, oldest first (conversation order).
    pub fn comments_for_post(
        &self,
        post_id: u64,
        page: usize,
        per_page: usize,
    ) -> (Vec<Comment>, usize) {
        let s = self.0.read();
        let on_post: Vec<Comment> =
            s.comments.values().filter(|c| c.post_id == post_id).cloned().collect();
        paginate(&on_post, page, per_page)
    }

    /// All comments across the site, newest first (moderation view).
    pub fn comments_page(&self, page: usize, per_page: usize) -> (Vec<Comment>, usize) {
        let s = self.0.read();
        let mut all: Vec<Comment> = s.comments.values().cloned().collect();
        all.reverse();
        paginate(&all, page, per_page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SharedStore {
        SharedStore::new(Some("admin@example.com".to_string()))
    }

    #[test]
    fn registration_assigns_roles_and_self_follow() {
        let s = store();
        let admin = s.register("admin@example.com", "admin", "secret").unwrap();
        let user = s.register("john@example.com", "john", "cat").unwrap();
        assert_eq!(admin.role, Role::Administrator);
        assert_eq!(user.role, Role::User);
        assert!(s.is_following(user.id, user.id));
        assert!(!user.confirmed);
    }

    #[test]
    fn duplicate_registration_conflicts() {
        let s = store();
        s.register("john@example.com", "john", "cat").unwrap();
        let dup_email = s.register("John@Example.com", "john2", "cat");
        assert!(matches!(dup_email, Err(AppError::Conflict { .. })));
        let dup_name = s.register("jane@example.com", "john", "cat");
        assert!(matches!(dup_name, Err(AppError::Conflict { .. })));
    }

    #[test]
    fn identifier_lookup_matches_email_or_username() {
        let s = store();
        let u = s.register("john@example.com", "john", "cat").unwrap();
        assert_eq!(s.find_by_identifier("JOHN@example.com").map(|x| x.id), Some(u.id));
        assert_eq!(s.find_by_identifier("john").map(|x| x.id), Some(u.id));
        assert!(s.find_by_identifier("nobody").is_none());
    }

    #[test]
    fn timeline_includes_followed_authors() {
        let s = store();
        let john = s.register("john@example.com", "john", "cat").unwrap();
        let jane = s.register("jane@example.com", "jane", "dog").unwrap();
        s.create_post(jane.id, "from jane").unwrap();
        s.create_post(john.id, "from john").unwrap();

        // Before following, only own posts show up.
        let (timeline, count) = s.followed_posts(john.id, 1, 10);
        assert_eq!(count, 1);
        assert_eq!(timeline[0].body, "from john");

        s.follow(john.id, jane.id).unwrap();
        let (timeline, count) = s.followed_posts(john.id, 1, 10);
        assert_eq!(count, 2);
        assert!(timeline.iter().any(|p| p.author_id == jane.id));

        s.unfollow(john.id, jane.id).unwrap();
        let (_, count) = s.followed_posts(john.id, 1, 10);
        assert_eq!(count, 1);
    }

    #[test]
    fn post_update_rerenders_html() {
        let s = store();
        let u = s.register("john@example.com", "john", "cat").unwrap();
        let p = s.create_post(u.id, "body of the *blog* post").unwrap();
        assert_eq!(p.body_html, "<p>body of the <em>blog</em> post</p>");
        let p = s.update_post(p.id, "updated body").unwrap();
        assert_eq!(p.body_html, "<p>updated body</p>");
    }

    #[test]
    fn pagination_slices_newest_first() {
        let s = store();
        let u = s.register("john@example.com", "john", "cat").unwrap();
        for i in 0..7 {
            s.create_post(u.id, &format!("post {i}")).unwrap();
        }
        let (page1, total) = s.posts_page(1, 3);
        assert_eq!(total, 7);
        assert_eq!(page1.len(), 3);
        assert_eq!(page1[0].body, "post 6");
        let (page3, _) = s.posts_page(3, 3);
        assert_eq!(page3.len(), 1);
        let (page9, _) = s.posts_page(9, 3);
        assert!(page9.is_empty());
    }

    #[test]
    fn comments_attach_to_posts() {
        let s = store();
        let u = s.register("john@example.com", "john", "cat").unwrap();
        let p = s.create_post(u.id, "a post").unwrap();
        let c = s.add_comment(p.id, u.id, "nice *post*").unwrap();
        assert_eq!(c.body_html, "<p>nice <em>post</em></p>");
        let (comments, count) = s.comments_for_post(p.id, 1, 10);
        assert_eq!(count, 1);
        assert_eq!(comments[0].id, c.id);
        let moderated = s.set_comment_disabled(c.id, true).unwrap();
        assert!(moderated.disabled);
        assert!(matches!(
            s.add_comment(999, u.id, "x"),
            Err(AppError::NotFound { .. })
        ));
    }
}
