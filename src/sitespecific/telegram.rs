use super::{ExtraActions, SiteHook};
use crate::extractor::ResponseView;
use url::Url;

/// Captures the embed view of public channel posts
///
/// `https://t.me/<channel>/<post>` renders its content through
/// `https://t.me/<channel>/<post>?embed=1&mode=tme`, which is added as an
/// asset of the post page.
pub struct TelegramHook;

fn embed_url(url: &Url) -> Option<Url> {
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    let [channel, post] = segments.as_slice() else {
        return None;
    };
    if !post.chars().all(|c| c.is_ascii_digit()) || url.query_pairs().any(|(k, _)| k == "embed") {
        return None;
    }
    let mut embed = url.clone();
    embed.set_path(&format!("/{}/{}", channel, post));
    embed.set_query(Some("embed=1&mode=tme"));
    Some(embed)
}

impl SiteHook for TelegramHook {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn matches(&self, url: &Url) -> bool {
        matches!(url.host_str(), Some("t.me") | Some("telegram.me"))
    }

    fn transform_response(&self, response: &ResponseView<'_>) -> ExtraActions {
        ExtraActions {
            assets: embed_url(response.url).into_iter().collect(),
            ..Default::default()
        }
    }
}
