//! Search filters and form-body assembly for the listing search.
//!
//! Bodies are ordered `(key, value)` lists rather than maps: the search form
//! sends one `szkbuChkbx` entry per ticked segment, and the server reads them
//! as a multi-value parameter.

use scraper::{Html, Selector};

use crate::config::FiltersConfig;
use crate::error::ScrapeError;

/// Ordered form body, repeated keys allowed
pub type FormFields = Vec<(String, String)>;

/// Echo of the page-size dropdown the site expects alongside `dspSsuPd`
const PAGE_SIZE_MAP_OUT: &str = "10>10<50>50<100>100<200>200<";

/// Echo of the market-segment checkboxes
const SEGMENT_MAP_OUT: &str = "011>Prime<012>Standard<013>Growth<008>TOKYO PRO Market<bj1>－<be1>－<111>Prime Foreign Stocks<112>Standard Foreign Stocks<113>Growth Foreign Stocks<bj2>－<be2>－<ETF>ETFs<ETN>ETNs<RET>Real Estate Investment Trusts (REITs)<IFD>Infrastructure Funds<999>Others<";

/// Echo of the head-office location dropdown
const LOCATION_MAP_OUT: &str = "+><01>Hokkaido<02>Aomori<03>Iwate<04>Miyagi<05>Akita<06>Yamagata<07>Fukushima<08>Ibaraki<09>Tochigi<10>Gunma<11>Saitama<12>Chiba<13>Tokyo<14>Kanagawa<15>Niigata<16>Toyama<17>Ishikawa<18>Fukui<19>Yamanashi<20>Nagano<21>Gifu<22>Shizuoka<23>Aichi<24>Mie<25>Shiga<26>Kyoto<27>Osaka<28>Hyogo<29>Nara<30>Wakayama<31>Tottori<32>Shimane<33>Okayama<34>Hiroshima<35>Yamaguchi<36>Tokushima<37>Kagawa<38>Ehime<39>Kochi<40>Fukuoka<41>Saga<42>Nagasaki<43>Kumamoto<44>Oita<45>Miyazaki<46>Kagoshima<47>Okinawa<";

/// Echo of the industry dropdown
const INDUSTRY_MAP_OUT: &str = "+><0050>Fishery, Agriculture & Forestry<1050>Mining<2050>Construction<3050>Foods<3100>Textiles & Apparels<3150>Pulp & Paper<3200>Chemicals<3250>Pharmaceutical<3300>Oil & Coal Products<3350>Rubber Products<3400>Glass & Ceramics Products<3450>Iron & Steel<3500>Nonferrous Metals<3550>Metal Products<3600>Machinery<3650>Electric Appliances<3700>Transportation Equipment<3750>Precision Instruments<3800>Other Products<4050>Electric Power & Gas<5050>Land Transportation<5100>Marine Transportation<5150>Air Transportation<5200>Warehousing & Harbor Transportation Services<5250>Information & Communication<6050>Wholesale Trade<6100>Retail Trade<7050>Banks<7100>Securities & Commodity Futures<7150>Insurance<7200>Other Financing Business<8050>Real Estate<9050>Services<9999>Nonclassifiable<";

/// Dropdown value meaning "any"
const ANY: &str = "+";

/// Filters for one run. Only `page_size` may change between runs.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchFilters {
    pub page_size: u32,
    pub segments: Vec<String>,
    pub industry: Option<String>,
    pub location: Option<String>,
    pub company_name: String,
    pub company_code: String,
    pub include_delisted: bool,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self::from(&FiltersConfig::default())
    }
}

impl From<&FiltersConfig> for SearchFilters {
    fn from(config: &FiltersConfig) -> Self {
        Self {
            page_size: config.page_size,
            segments: config.segments.clone(),
            industry: config.industry.clone(),
            location: config.location.clone(),
            company_name: config.company_name.clone(),
            company_code: config.company_code.clone(),
            include_delisted: config.include_delisted,
        }
    }
}

impl SearchFilters {
    /// Encode the filters as the search form submits them
    pub fn to_fields(&self) -> FormFields {
        let mut fields = vec![
            field("ListShow", "ListShow"),
            field("sniMtGmnId", ""),
            field("dspSsuPd", self.page_size.to_string()),
            field("dspSsuPdMapOut", PAGE_SIZE_MAP_OUT),
            field("mgrMiTxtBx", &self.company_name),
            field("eqMgrCd", &self.company_code),
            field("hnsShzitPd", self.location.as_deref().unwrap_or(ANY)),
            field("hnsShzitPdMapOut", LOCATION_MAP_OUT),
        ];

        for segment in &self.segments {
            fields.push(field("szkbuChkbx", segment));
        }
        fields.push(field("szkbuChkbxMapOut", SEGMENT_MAP_OUT));

        fields.push(field("gyshKbnPd", self.industry.as_deref().unwrap_or(ANY)));
        fields.push(field("gyshKbnPdMapOut", INDUSTRY_MAP_OUT));

        if self.include_delisted {
            fields.push(field("jjHisiKbnChkbx", "on"));
        }

        fields
    }
}

fn field(key: &str, value: impl Into<String>) -> (String, String) {
    (key.to_string(), value.into())
}

/// Merge hidden fields echoed by the server with the explicit filters.
///
/// Hidden fields come first. Any hidden key that the filters also set is
/// dropped so the explicit value is the only one on the wire.
pub fn build_form(filters: &SearchFilters, hidden: Option<&[(String, String)]>) -> FormFields {
    let explicit = filters.to_fields();
    let mut form = FormFields::with_capacity(explicit.len() + hidden.map_or(0, <[_]>::len));

    if let Some(hidden) = hidden {
        form.extend(
            hidden
                .iter()
                .filter(|(key, _)| !explicit.iter().any(|(k, _)| k == key))
                .cloned(),
        );
    }

    form.extend(explicit);
    form
}

/// Replace every entry named `key` with a single `key=value`
pub fn set_field(form: &mut FormFields, key: &str, value: impl Into<String>) {
    form.retain(|(k, _)| k != key);
    form.push((key.to_string(), value.into()));
}

/// Hidden inputs of the form named `form_name`, in document order.
///
/// Returns `None` when the document has no such form.
pub fn hidden_fields(document: &Html, form_name: &str) -> Result<Option<FormFields>, ScrapeError> {
    let form_selector = Selector::parse(&format!("form[name=\"{form_name}\"]"))
        .map_err(|_| ScrapeError::Selector(form_name.to_string()))?;
    let hidden_selector = Selector::parse("input[type=\"hidden\"]")
        .map_err(|_| ScrapeError::Selector("input[type=hidden]".to_string()))?;

    let Some(form) = document.select(&form_selector).next() else {
        return Ok(None);
    };

    let fields = form
        .select(&hidden_selector)
        .filter_map(|input| {
            let name = input.value().attr("name")?;
            let value = input.value().attr("value").unwrap_or_default();
            Some((name.to_string(), value.to_string()))
        })
        .collect();

    Ok(Some(fields))
}
