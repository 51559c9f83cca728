use anyhow::{anyhow, Result};
use scraper::{ElementRef, Html, Selector};

use crate::models::ItemId;

pub fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {css}: {e:?}"))
}

/// Whitespace-normalized text of an element
pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn document_text(document: &Html) -> String {
    element_text(document.root_element())
}

/// Ids of all links matching `css`, in page order, without repeats
pub fn linked_ids(document: &Html, css: &str) -> Result<Vec<ItemId>> {
    let links = selector(css)?;
    let mut ids: Vec<ItemId> = Vec::new();
    for link in document.select(&links) {
        if let Some(id) = link.value().attr("href").and_then(ItemId::from_url) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    Ok(ids)
}

/// Number written right before one of `words`, as in `"2 bedrooms"` or
/// `"1,204 reviews"`. A word only matches when it is not the start of a longer word.
pub fn number_before(text: &str, words: &[&str]) -> Option<f32> {
    for word in words {
        for (pos, _) in text.match_indices(word) {
            let after = &text[pos + word.len()..];
            if after.chars().next().is_some_and(char::is_alphabetic) {
                continue;
            }

            let before = text[..pos].trim_end();
            let start = before
                .char_indices()
                .rev()
                .take_while(|(_, c)| c.is_ascii_digit() || *c == ',' || *c == '.')
                .last()
                .map(|(idx, _)| idx);
            let Some(start) = start else {
                continue;
            };
            if let Ok(n) = before[start..].replace(',', "").parse::<f32>() {
                return Some(n);
            }
        }
    }
    None
}

/// Whole-dollar amount following the first `$` in `text`
pub fn dollars(text: &str) -> Option<u32> {
    let (_, rest) = text.split_once('$')?;
    let digits: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .filter(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Latitude and longitude from a map link such as
/// `https://www.google.com/maps/@51.0447,-114.0719,14z`
pub fn map_coordinates(href: &str) -> Option<(f64, f64)> {
    let (_, rest) = href.split_once("/@")?;
    let mut parts = rest.split(',');
    let lat: f64 = parts.next()?.parse().ok()?;
    let long: f64 = parts.next()?.parse().ok()?;
    ((-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&long)).then_some((lat, long))
}
