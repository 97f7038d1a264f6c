// libs/booking-cell/src/services/meeting.rs
use uuid::Uuid;

use shared_config::AppConfig;

/// Generates opaque meeting links for video appointments. A link is generated
/// once per appointment and never regenerated; the video infrastructure behind
/// the URL is out of scope here.
#[derive(Debug, Clone)]
pub struct MeetingLinkService {
    base_url: String,
}

impl MeetingLinkService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            base_url: config.meeting_link_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn generate(&self) -> String {
        format!("{}/room/{}", self.base_url, Uuid::new_v4())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_utils::test_utils::TestConfig;

    #[test]
    fn links_are_unique_and_rooted_at_base_url() {
        let service = MeetingLinkService::new(&TestConfig::default().to_app_config());

        let a = service.generate();
        let b = service.generate();

        assert!(a.starts_with("https://meet.test.vetbook.app/room/"));
        assert_ne!(a, b);
    }
}
