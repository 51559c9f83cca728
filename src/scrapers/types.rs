use chrono::NaiveDate;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};

pub const AIRBNB_URL: &str = "https://www.airbnb.ca";

/// Bytes that cannot appear raw in a URL path segment
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Where and when to search for stays
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    pub city: String,
    pub province: String,
    /// First night of the stay
    pub checkin: Option<NaiveDate>,
    /// Departure day
    pub checkout: Option<NaiveDate>,
}

impl SearchParams {
    pub fn new(city: impl Into<String>, province: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            province: province.into(),
            checkin: None,
            checkout: None,
        }
    }

    pub fn with_dates(mut self, checkin: NaiveDate, checkout: NaiveDate) -> Self {
        self.checkin = Some(checkin);
        self.checkout = Some(checkout);
        self
    }

    /// Search results URL, e.g. `https://www.airbnb.ca/s/Calgary--AB/homes`
    pub fn search_url(&self) -> String {
        let mut url = format!(
            "{}/s/{}--{}/homes",
            AIRBNB_URL,
            path_segment(&self.city),
            path_segment(&self.province)
        );
        if let (Some(checkin), Some(checkout)) = (self.checkin, self.checkout) {
            url.push_str(&format!(
                "?checkin={}&checkout={}",
                checkin.format("%Y-%m-%d"),
                checkout.format("%Y-%m-%d")
            ));
        }
        url
    }
}

fn path_segment(s: &str) -> String {
    let dashed = s.split_whitespace().collect::<Vec<_>>().join("-");
    utf8_percent_encode(&dashed, PATH_SEGMENT).to_string()
}

pub fn room_url(id: &str) -> String {
    format!("{AIRBNB_URL}/rooms/{id}")
}

pub fn host_url(id: &str) -> String {
    format!("{AIRBNB_URL}/users/show/{id}")
}
