use std::fmt;

use serde_derive::{ Deserialize, Serialize };

pub const UNAVAILABLE_TITLE: &str = "Failed to load news";
const UNAVAILABLE_LINK: &str = "#";
const UNAVAILABLE_SOURCE: &str = "error";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct NewsItem {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub source: String,
}

impl NewsItem {
    /// Placeholder shown instead of an empty panel when the news fetch fails.
    pub fn unavailable() -> Self {
        NewsItem {
            title: UNAVAILABLE_TITLE.to_string(),
            link: UNAVAILABLE_LINK.to_string(),
            source: UNAVAILABLE_SOURCE.to_string(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        *self == NewsItem::unavailable()
    }
}

pub struct NewsPanel<'a>(pub &'a [NewsItem]);

impl fmt::Display for NewsPanel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Cybersecurity News")?;
        for n in self.0 {
            if n.source.is_empty() {
                writeln!(f, "  - {}", n.title)?;
            } else {
                writeln!(f, "  - {} ({})", n.title, n.source)?;
            }
            if n.link != UNAVAILABLE_LINK && !n.link.is_empty() {
                writeln!(f, "    {}", n.link)?;
            }
        }
        Ok(())
    }
}
