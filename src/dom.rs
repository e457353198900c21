use scraper::{ElementRef, Html, Selector};

use crate::error::DownloadError;

/// Detached copy of one element of a rendered page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementSnapshot {
    pub text: String,
    pub attributes: Vec<(String, String)>,
    pub inner_html: String,
}

impl ElementSnapshot {
    fn from_element(element: ElementRef<'_>) -> Self {
        Self {
            text: normalized_text(element),
            attributes: element
                .value()
                .attrs()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            inner_html: element.inner_html(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// First non-blank attribute among `names`, in priority order.
    pub fn first_attr(&self, names: &[&str]) -> Option<&str> {
        names
            .iter()
            .filter_map(|name| self.attr(name))
            .map(str::trim)
            .find(|value| !value.is_empty())
    }

    /// Text of the first descendant matching `css`.
    pub fn child_text(&self, css: &str) -> Result<Option<String>, DownloadError> {
        let fragment = Html::parse_fragment(&self.inner_html);
        let selector = parse_selector(css)?;
        Ok(fragment.select(&selector).next().map(normalized_text))
    }
}

pub fn parse_selector(css: &str) -> Result<Selector, DownloadError> {
    Selector::parse(css)
        .map_err(|_| DownloadError::SelectorError(format!("Failed to parse {} selector", css)))
}

/// Every element of `html` matching `css`, in document order.
pub fn snapshot(html: &str, css: &str) -> Result<Vec<ElementSnapshot>, DownloadError> {
    let document = Html::parse_document(html.trim());
    let selector = parse_selector(css)?;
    Ok(document.select(&selector).map(ElementSnapshot::from_element).collect())
}

pub fn first_text(html: &str, css: &str) -> Result<Option<String>, DownloadError> {
    Ok(snapshot(html, css)?
        .into_iter()
        .map(|element| element.text)
        .find(|text| !text.is_empty()))
}

fn normalized_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reads_attributes_and_text() {
        let html = r#"<ul class="version-chap">
            <li><a href="https://example.com/c/2">  Capítulo 2 </a></li>
            <li><a href="https://example.com/c/1">Capítulo <b>1</b></a></li>
        </ul>"#;

        let links = snapshot(html, "ul.version-chap a").unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].attr("href"), Some("https://example.com/c/2"));
        assert_eq!(links[0].text, "Capítulo 2");
        assert_eq!(links[1].text, "Capítulo 1");
    }

    #[test]
    fn test_first_attr_skips_blank_values() {
        let html = r#"<div id="paginas"><img data-src="  " src="/a.jpg"></div>"#;
        let images = snapshot(html, "#paginas img").unwrap();
        assert_eq!(images[0].first_attr(&["data-src", "src"]), Some("/a.jpg"));
    }

    #[test]
    fn test_child_text() {
        let html = r#"<a href="/chapter/9"><span class="text-white">Cap 9.5</span><span>new</span></a>"#;
        let links = snapshot(html, "a[href*=\"/chapter/\"]").unwrap();
        assert_eq!(links[0].child_text("span.text-white").unwrap(), Some("Cap 9.5".to_string()));
    }

    #[test]
    fn test_invalid_selector_is_an_error() {
        assert!(matches!(snapshot("<p></p>", "p[["), Err(DownloadError::SelectorError(_))));
    }
}
