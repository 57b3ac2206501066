//! Sliding-window (fixed bucket) rate limiter, keyed on `(connId, category)`.
//! Overflow is a silent drop: no ack, no error broadcast. Buckets are freed
//! on disconnect.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Media,
    Chat,
    Admin,
    Default,
}

impl Category {
    fn limit(self) -> u32 {
        match self {
            Category::Media => 30,
            Category::Chat => 5,
            Category::Admin => 3,
            Category::Default => 10,
        }
    }

    fn window() -> Duration {
        Duration::from_secs(1)
    }
}

struct Bucket {
    count: u32,
    reset_at: Instant,
}

pub struct RateLimiter {
    buckets: DashMap<(Uuid, &'static str), Bucket>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    fn key(category: Category) -> &'static str {
        match category {
            Category::Media => "media",
            Category::Chat => "chat",
            Category::Admin => "admin",
            Category::Default => "default",
        }
    }

    /// Returns `true` if the event is allowed, `false` if it should be
    /// silently dropped.
    pub fn check(&self, conn_id: Uuid, category: Category) -> bool {
        let now = Instant::now();
        let key = (conn_id, Self::key(category));
        let mut entry = self.buckets.entry(key).or_insert_with(|| Bucket {
            count: 0,
            reset_at: now + Category::window(),
        });

        if now >= entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + Category::window();
        }

        if entry.count >= category.limit() {
            return false;
        }
        entry.count += 1;
        true
    }

    pub fn clear_connection(&self, conn_id: Uuid) {
        self.buckets.retain(|(id, _), _| *id != conn_id);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Classifies an inbound event name into a rate-limit category.
pub fn classify(event: &str) -> Category {
    match event {
        "create-transport" | "connect-transport" | "produce" | "consume"
        | "resume-consumer" | "set-preferred-layers" | "pause-producer"
        | "resume-producer" | "close-producer" => Category::Media,
        "send-chat" | "ask-question" | "upvote-question" => Category::Chat,
        "kick-participant" | "transfer-host" | "lobby-admit" | "lobby-reject"
        | "move-to-lobby" | "invite-participant" | "create-breakout" | "close-breakouts"
        | "broadcast-to-breakouts" | "end-meeting" => Category::Admin,
        _ => Category::Default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit_then_drops() {
        let limiter = RateLimiter::new();
        let conn = Uuid::new_v4();
        for _ in 0..3 {
            assert!(limiter.check(conn, Category::Admin));
        }
        assert!(!limiter.check(conn, Category::Admin));
    }

    #[test]
    fn categories_are_independent() {
        let limiter = RateLimiter::new();
        let conn = Uuid::new_v4();
        for _ in 0..3 {
            assert!(limiter.check(conn, Category::Admin));
        }
        assert!(limiter.check(conn, Category::Chat));
    }

    #[test]
    fn classify_maps_known_events() {
        assert!(matches!(classify("produce"), Category::Media));
        assert!(matches!(classify("send-chat"), Category::Chat));
        assert!(matches!(classify("kick-participant"), Category::Admin));
        assert!(matches!(classify("join-meeting"), Category::Default));
    }
}
