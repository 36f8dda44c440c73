//! Meeting link resolution.
//!
//! [`MeetingLinkResolver`] picks the one URL a reminder should offer for an
//! event. Sources are tried in a fixed priority order:
//!
//! 1. the explicit video link (`hangoutLink`)
//! 2. the first `video` entry point of the conferencing descriptor
//! 3. a vendor pattern scan of the location
//! 4. a vendor pattern scan of the description
//! 5. a vendor pattern scan of the canonical event link
//!
//! The scan recognises Zoom, ZoomGov, Google Meet, Teams, Webex and Jitsi, in
//! that order. Outlook SafeLinks are unwrapped before matching.
//!
//! # Example
//!
//! ```
//! use vivcal_core::links::{LinkKind, scan_text};
//!
//! let found = scan_text("Dial in: https://acme.zoom.us/j/123456789?pwd=abc).");
//! assert_eq!(found, Some((LinkKind::Zoom, "https://acme.zoom.us/j/123456789?pwd=abc".to_string())));
//! ```

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::event::CalendarEvent;

static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"'\]]+"#).expect("Invalid URL regex"));

/// SafeLinks carry the original URL, percent-encoded, in the `url` parameter.
static SAFELINK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://[^/]*safelinks\.protection\.outlook\.com/?\?[^?]*?url=([^&]+)")
        .expect("Invalid SafeLink regex")
});

// Vendor patterns anchor on join paths so that download pages, docs and
// dashboards on the same domains never outrank a real meeting link.

static ZOOM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://([^/]*\.)?zoom\.us/(j|my|w|s)/[^/?#]+").expect("Invalid Zoom regex")
});

static ZOOMGOV_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://([^/]*\.)?zoomgov\.com/(j|my|w|s)/[^/?#]+")
        .expect("Invalid ZoomGov regex")
});

static MEET_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://meet\.google\.com/([a-z]{3}-[a-z]{4}-[a-z]{3}|lookup/)")
        .expect("Invalid Meet regex")
});

static TEAMS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://teams\.(microsoft\.com/l/meetup-join/|live\.com/(meet|l/meetup-join)/)")
        .expect("Invalid Teams regex")
});

/// Personal rooms (`/meet/`, `/join/`), site scoped `j.php` links and the
/// join service, optionally behind a site segment.
static WEBEX_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https?://([A-Za-z0-9-]+\.)*webex\.com/([A-Za-z0-9_-]+/)?(meet/|join/|j\.php|wbxmjs/joinservice/)",
    )
    .expect("Invalid Webex regex")
});

static JITSI_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://meet\.jit\.si/[^/?#]+").expect("Invalid Jitsi regex")
});

/// Vendor shapes in scan priority order.
static VENDORS: LazyLock<[(LinkKind, &'static Regex); 6]> = LazyLock::new(|| {
    [
        (LinkKind::Zoom, &*ZOOM_REGEX),
        (LinkKind::ZoomGov, &*ZOOMGOV_REGEX),
        (LinkKind::GoogleMeet, &*MEET_REGEX),
        (LinkKind::Teams, &*TEAMS_REGEX),
        (LinkKind::Webex, &*WEBEX_REGEX),
        (LinkKind::Jitsi, &*JITSI_REGEX),
    ]
});

/// Conferencing service a link belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    Zoom,
    ZoomGov,
    GoogleMeet,
    Teams,
    Webex,
    Jitsi,
    /// A link from a structured field that matches no known vendor.
    Other,
}

impl LinkKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Zoom => "Zoom",
            Self::ZoomGov => "Zoom (Gov)",
            Self::GoogleMeet => "Google Meet",
            Self::Teams => "Microsoft Teams",
            Self::Webex => "Cisco Webex",
            Self::Jitsi => "Jitsi",
            Self::Other => "Link",
        }
    }
}

/// Which event field a link came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkSource {
    HangoutLink,
    ConferenceData,
    Location,
    Description,
    HtmlLink,
}

/// The resolved join link for an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingLink {
    pub kind: LinkKind,
    pub url: String,
    pub source: LinkSource,
}

/// Resolves the join link of an event. Stateless; see the module docs for the
/// priority order.
#[derive(Debug, Default, Clone, Copy)]
pub struct MeetingLinkResolver;

impl MeetingLinkResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(&self, event: &CalendarEvent) -> Option<MeetingLink> {
        if let Some(url) = event.hangout_link.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            return Some(structured(url, LinkSource::HangoutLink));
        }

        if let Some(entry) = event.conference.as_ref().and_then(|c| c.video_entry()) {
            let url = entry.uri.trim();
            if !url.is_empty() {
                return Some(structured(url, LinkSource::ConferenceData));
            }
        }

        let scanned = [
            (event.location.as_deref(), LinkSource::Location),
            (event.description.as_deref(), LinkSource::Description),
            (event.html_link.as_deref(), LinkSource::HtmlLink),
        ];
        scanned.into_iter().find_map(|(text, source)| {
            let (kind, url) = scan_text(text?)?;
            Some(MeetingLink { kind, url, source })
        })
    }
}

/// Shorthand for `MeetingLinkResolver::new().resolve(event).map(|l| l.url)`.
pub fn resolve_url(event: &CalendarEvent) -> Option<String> {
    MeetingLinkResolver::new().resolve(event).map(|link| link.url)
}

/// Scans free text for the highest priority vendor link.
///
/// Vendor order wins over position in the text: a Teams link that appears
/// before a Zoom link still loses to the Zoom link.
pub fn scan_text(text: &str) -> Option<(LinkKind, String)> {
    let urls: Vec<String> = URL_REGEX
        .find_iter(text)
        .map(|m| clean_url(&unwrap_safelink(m.as_str())))
        .collect();

    VENDORS.iter().find_map(|(kind, regex)| {
        urls.iter()
            .find(|url| regex.is_match(url))
            .map(|url| (*kind, url.clone()))
    })
}

/// Classifies a URL without scanning; unknown hosts map to [`LinkKind::Other`].
pub fn classify(url: &str) -> LinkKind {
    VENDORS
        .iter()
        .find(|(_, regex)| regex.is_match(url))
        .map_or(LinkKind::Other, |(kind, _)| *kind)
}

fn structured(url: &str, source: LinkSource) -> MeetingLink {
    MeetingLink {
        kind: classify(url),
        url: url.to_string(),
        source,
    }
}

fn unwrap_safelink(url: &str) -> String {
    if let Some(encoded) = SAFELINK_REGEX.captures(url).and_then(|caps| caps.get(1)) {
        if let Ok(decoded) = urlencoding::decode(encoded.as_str()) {
            return decoded.into_owned();
        }
    }
    url.to_string()
}

/// Strips punctuation and closing brackets that prose leaves glued to a URL.
fn clean_url(url: &str) -> String {
    url.trim_end_matches(['.', ',', ';', ':', '!', '?', ')', ']', '}', '>', '\'', '"'])
        .to_string()
}
