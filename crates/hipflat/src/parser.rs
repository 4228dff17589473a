use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::types::{DetailFields, ListingRecord};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("No detail markup found on {0}")]
    NotDetailPage(String),
}

fn sel(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {css}: {e}"))
}

static SEL_CARD: LazyLock<Selector> = LazyLock::new(|| sel(".snippet"));
static SEL_CARD_LINK: LazyLock<Selector> = LazyLock::new(|| sel("a[href]"));
static SEL_CARD_TITLE: LazyLock<Selector> = LazyLock::new(|| sel(".snippet-title"));
static SEL_CARD_PRICE: LazyLock<Selector> = LazyLock::new(|| sel(".snippet-price"));
static SEL_CARD_ADDRESS: LazyLock<Selector> = LazyLock::new(|| sel(".snippet-address"));
static SEL_CARD_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| sel(".snippet-description"));
static SEL_CARD_SUMMARY_ITEM: LazyLock<Selector> = LazyLock::new(|| sel(".snippet-summary li"));

static SEL_PAGINATION_ITEM: LazyLock<Selector> = LazyLock::new(|| sel(".pagination li.page"));
static SEL_LAST_PAGE: LazyLock<Selector> = LazyLock::new(|| sel(r#"a[data-page="last"][href]"#));

static SEL_DETAIL_MARKERS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        "#basic-information",
        ".basic-information__list",
        ".property-facts",
        ".characteristics",
        ".detail-list",
        ".description__listing",
        ".description__listing-truncated",
        ".property-description",
        ".detail-description",
        ".amenities",
        ".features__list",
        ".property-features",
        ".id .id__text",
    ]
    .into_iter()
    .map(sel)
    .collect()
});
static SEL_PROPERTY_ID: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        ".id .id__text + span",
        ".breadcrumb-custom-item:last-child",
        ".property-id",
    ]
    .into_iter()
    .map(sel)
    .collect()
});
static SEL_FIRST_BASIC_VALUE: LazyLock<Selector> = LazyLock::new(|| {
    sel("#basic-information > ul > li:nth-child(1) > span.basic-information__list__item__value")
});
static SEL_FLOOR: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [".characteristics .floor", ".floor .data"]
        .into_iter()
        .map(sel)
        .collect()
});
static SEL_FOURTH_BASIC_VALUE: LazyLock<Selector> = LazyLock::new(|| {
    sel("#basic-information > ul > li:nth-child(4) > span.basic-information__list__item__value")
});
static SEL_FACT_ITEM: LazyLock<Selector> = LazyLock::new(|| sel(".property-facts .fact-item"));
static SEL_FACT_LABEL: LazyLock<Selector> = LazyLock::new(|| sel(".fact-label"));
static SEL_FACT_VALUE: LazyLock<Selector> = LazyLock::new(|| sel(".fact-value"));
static SEL_BASIC_ITEM: LazyLock<Selector> =
    LazyLock::new(|| sel(".basic-information__list__item"));
static SEL_BASIC_LABEL: LazyLock<Selector> =
    LazyLock::new(|| sel(".basic-information__list__item__label"));
static SEL_BASIC_VALUE: LazyLock<Selector> =
    LazyLock::new(|| sel(".basic-information__list__item__value"));
static SEL_LOOSE_FACT: LazyLock<Selector> = LazyLock::new(|| {
    sel(".characteristics li, .characteristics .item, .detail-list li, .detail-list .detail-item")
});
static SEL_DESCRIPTION: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        ".description__listing",
        ".description__listing-truncated",
        ".property-description",
        ".detail-description",
    ]
    .into_iter()
    .map(sel)
    .collect()
});
static SEL_AMENITIES: LazyLock<Vec<(Selector, Selector)>> = LazyLock::new(|| {
    [
        (".amenities", ".amenity-item"),
        (".features__list", ".features__list__item__name"),
        (".property-features", "li, .item"),
    ]
    .into_iter()
    .map(|(section, item)| (sel(section), sel(item)))
    .collect()
});
static SEL_CONTACT: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [".contact-section", ".agent-info", ".listing-contact"]
        .into_iter()
        .map(sel)
        .collect()
});

static RE_AREA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:m²|m2\b|sq\.?\s?m\b|sqm\b)").expect("invalid regex: area")
});
static RE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("invalid regex: number"));
static RE_PAGE_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]page=(\d+)").expect("invalid regex: page param"));
static RE_POSTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?:リストアップされた日付|掲載日|掲載)\s*[：:]\s*(",
        r"\d{4}\s*[/年.\-]\s*\d{1,2}\s*[/月.\-]\s*\d{1,2}\s*日?",
        r"|[A-Z][a-z]{2,8}\.?\s+\d{1,2},?\s+\d{4}",
        r"|\d{1,2}\s+[A-Z][a-z]{2,8}\.?\s+\d{4}",
        r"|\S+)",
    ))
    .expect("invalid regex: posted")
});
static RE_FLOOR: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"階数\s*[：:]\s*(\d+)", r"(\d+)\s*階", r"(?i)\bfloor\s*[：:]\s*(\d+)"]
        .into_iter()
        .map(|p| Regex::new(p).expect("invalid regex: floor"))
        .collect()
});
static RE_CONTRACT: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(\d+)\s*(?:years?|months?|年間|ヶ月|か月|カ月)\s*contract",
        r"(?i)contract\s*(?:of\s*)?(\d+)\s*(?:years?|months?|年間|ヶ月|か月|カ月)",
        r"最低契約期間\s*[：:]?\s*(\d+)\s*(?:ヶ月|年間|か月|カ月)",
        r"契約期間\s*[：:]?\s*(\d+)\s*(?:ヶ月|年間|か月|カ月)",
    ]
    .into_iter()
    .map(|p| Regex::new(p).expect("invalid regex: contract"))
    .collect()
});
static RE_LINE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bline(?:\s*id)?\s*[:：]?\s*(@?[A-Za-z0-9._\-]+)").expect("invalid regex: line id")
});

const WIFI_TERMS: [&str; 5] = ["wifi", "wi-fi", "internet", "インターネット", "ネット接続"];
const SAUNA_TERMS: [&str; 2] = ["sauna", "サウナ"];
const POSTED_LABELS: [&str; 4] = ["リストアップされた日付", "掲載日", "listed", "posted"];
const AREA_LABELS: [&str; 5] = ["サイズ", "面積", "エリア", "size", "area"];

fn elem_text(element: ElementRef) -> String {
    element.text().collect::<String>()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

fn select_text(scope: ElementRef, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .next()
        .and_then(|e| non_empty(normalize_whitespace(&elem_text(e))))
}

fn first_text(document: &Html, selectors: &[Selector]) -> Option<String> {
    selectors.iter().find_map(|s| {
        document
            .select(s)
            .find_map(|e| non_empty(normalize_whitespace(&elem_text(e))))
    })
}

fn absolute_url(href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if let Some(rest) = href.strip_prefix("//") {
        format!("https://{}", rest)
    } else if href.starts_with('/') {
        format!("{}{}", crate::SITE_URL, href)
    } else {
        format!("{}/{}", crate::SITE_URL, href)
    }
}

fn parse_area(text: &str) -> Option<f64> {
    let cleaned = text.replace(',', "");
    RE_AREA
        .captures(&cleaned)
        .and_then(|caps| caps[1].parse().ok())
}

fn parse_number(text: &str) -> Option<f64> {
    let cleaned = text.replace(',', "");
    RE_NUMBER
        .find(&cleaned)
        .and_then(|m| m.as_str().parse().ok())
}

fn first_integer(text: &str) -> Option<u32> {
    text.split(|c: char| !c.is_ascii_digit())
        .find(|part| !part.is_empty())
        .and_then(|part| part.parse().ok())
}

fn contains_any(text: &str, terms: &[&str]) -> bool {
    let lower = text.to_lowercase();
    terms.iter().any(|t| lower.contains(t))
}

fn mentions_wifi(text: &str) -> bool {
    contains_any(text, &WIFI_TERMS)
}

fn mentions_sauna(text: &str) -> bool {
    contains_any(text, &SAUNA_TERMS)
}

fn mentions_furnished(text: &str) -> bool {
    let lower = text.to_lowercase();
    (lower.contains("furnished") && !lower.contains("unfurnished"))
        || (text.contains("家具") && !text.contains("家具なし"))
}

fn furnished_value(value: &str) -> bool {
    let lower = value.to_lowercase();
    !(lower.contains("unfurnished")
        || lower == "no"
        || value.contains("なし")
        || value.contains("無"))
}

fn contract_term(text: &str) -> Option<String> {
    RE_CONTRACT
        .iter()
        .find_map(|re| re.find(text).map(|m| m.as_str().to_string()))
}

/// Parses one listing index page into records, in page order.
///
/// Cards without a link are skipped; every other missing field falls back to
/// the record default. A page without cards yields an empty vector.
pub fn parse_listing_page(html: &str) -> Vec<ListingRecord> {
    let document = Html::parse_document(html);
    let mut records = Vec::new();

    for card in document.select(&SEL_CARD) {
        match parse_card(card) {
            Some(record) => {
                log::debug!("Parsed card {}", record.url);
                records.push(record);
            }
            None => log::debug!("Skipping card without a link"),
        }
    }

    records
}

fn parse_card(card: ElementRef) -> Option<ListingRecord> {
    let href = card
        .select(&SEL_CARD_LINK)
        .filter_map(|a| a.value().attr("href"))
        .map(str::trim)
        .find(|href| !href.is_empty() && !href.starts_with('#'))?;

    let description = select_text(card, &SEL_CARD_DESCRIPTION);
    let (furnished, wifi) = description
        .as_deref()
        .map(|d| (mentions_furnished(d), mentions_wifi(d)))
        .unwrap_or_default();

    Some(ListingRecord {
        name: select_text(card, &SEL_CARD_TITLE),
        address: select_text(card, &SEL_CARD_ADDRESS),
        monthly_rent: select_text(card, &SEL_CARD_PRICE),
        floor_area_m2: card_floor_area(card),
        description,
        furnished,
        wifi,
        ..ListingRecord::new(absolute_url(href))
    })
}

fn card_floor_area(card: ElementRef) -> Option<f64> {
    card.select(&SEL_CARD_SUMMARY_ITEM)
        .find_map(|li| parse_area(&elem_text(li)))
        .or_else(|| parse_area(&elem_text(card)))
}

/// Highest page number advertised by the pagination widget, if any.
pub fn parse_total_pages(html: &str) -> Option<u32> {
    let document = Html::parse_document(html);

    let from_items = document
        .select(&SEL_PAGINATION_ITEM)
        .filter_map(|li| {
            li.value()
                .attr("data-value")
                .and_then(|v| v.trim().parse::<u32>().ok())
                .or_else(|| normalize_whitespace(&elem_text(li)).parse::<u32>().ok())
        })
        .max();

    from_items.or_else(|| {
        document
            .select(&SEL_LAST_PAGE)
            .filter_map(|a| a.value().attr("href"))
            .find_map(|href| RE_PAGE_PARAM.captures(href)?[1].parse().ok())
    })
}

/// Extracts supplementary fields from a detail page.
///
/// `base` supplies the card description used as a fallback for furnished,
/// minimum stay and amenity hints when the detail page has no description.
pub fn parse_detail_page(html: &str, base: &ListingRecord) -> Result<DetailFields, ParseError> {
    let document = Html::parse_document(html);

    if !SEL_DETAIL_MARKERS
        .iter()
        .any(|s| document.select(s).next().is_some())
    {
        return Err(ParseError::NotDetailPage(base.url.clone()));
    }

    let page_text = normalize_whitespace(&elem_text(document.root_element()));
    let facts = collect_facts(&document);

    let mut fields = DetailFields {
        property_id: first_text(&document, &SEL_PROPERTY_ID),
        posted_date: posted_date(&document, &facts, &page_text),
        floor: floor(&document, &facts, &page_text),
        ..Default::default()
    };

    for (label, value) in &facts {
        let lower = label.to_lowercase();
        if (label.contains("最低") && (label.contains("利用") || label.contains("契約")))
            || lower.contains("minimum")
        {
            fields.minimum_stay.get_or_insert_with(|| value.clone());
        } else if label.contains("家具") || lower.contains("furnish") {
            fields.furnished = Some(furnished_value(value));
        } else if contains_any(label, &AREA_LABELS) {
            if let Some(area) = parse_area(value).or_else(|| parse_number(value)) {
                fields.floor_area_m2 = Some(area);
            }
        }
    }

    let description = first_text(&document, &SEL_DESCRIPTION);
    let hint_text = description.as_deref().or(base.description.as_deref());

    if let Some(text) = hint_text {
        if fields.furnished.is_none() && mentions_furnished(text) {
            fields.furnished = Some(true);
        }
        if fields.minimum_stay.is_none() {
            fields.minimum_stay = contract_term(text);
        }
    }

    match amenity_names(&document) {
        Some(names) => {
            fields.sauna = Some(names.iter().any(|n| mentions_sauna(n)));
            fields.wifi = Some(names.iter().any(|n| mentions_wifi(n)));
        }
        None => {
            if let Some(text) = hint_text {
                if mentions_wifi(text) {
                    fields.wifi = Some(true);
                }
                if mentions_sauna(text) {
                    fields.sauna = Some(true);
                }
            }
        }
    }

    fields.line_id = line_id(&document);
    fields.description = description;

    Ok(fields)
}

fn collect_facts(document: &Html) -> Vec<(String, String)> {
    let labelled = |item_sel: &Selector, label_sel: &Selector, value_sel: &Selector| {
        document
            .select(item_sel)
            .filter_map(|item| {
                let label = select_text(item, label_sel)?;
                let value = select_text(item, value_sel)?;
                Some((label, value))
            })
            .collect::<Vec<_>>()
    };

    let mut facts = labelled(&SEL_FACT_ITEM, &SEL_FACT_LABEL, &SEL_FACT_VALUE);
    facts.extend(labelled(&SEL_BASIC_ITEM, &SEL_BASIC_LABEL, &SEL_BASIC_VALUE));
    facts.extend(document.select(&SEL_LOOSE_FACT).filter_map(|item| {
        let text = normalize_whitespace(&elem_text(item));
        let (label, value) = text.split_once(':').or_else(|| text.split_once('：'))?;
        let (label, value) = (label.trim(), value.trim());
        (!label.is_empty() && !value.is_empty()).then(|| (label.to_string(), value.to_string()))
    }));

    facts
}

fn posted_date(document: &Html, facts: &[(String, String)], page_text: &str) -> Option<String> {
    facts
        .iter()
        .find(|(label, _)| contains_any(label, &POSTED_LABELS))
        .map(|(_, value)| value.clone())
        .or_else(|| {
            document
                .select(&SEL_FIRST_BASIC_VALUE)
                .find_map(|e| non_empty(normalize_whitespace(&elem_text(e))))
        })
        .or_else(|| RE_POSTED.captures(page_text).map(|caps| caps[1].to_string()))
}

fn floor(document: &Html, facts: &[(String, String)], page_text: &str) -> Option<u32> {
    SEL_FLOOR
        .iter()
        .find_map(|s| document.select(s).find_map(|e| first_integer(&elem_text(e))))
        .or_else(|| {
            // Unlabelled slot; an area value there is not a floor.
            document
                .select(&SEL_FOURTH_BASIC_VALUE)
                .map(elem_text)
                .find(|text| parse_area(text).is_none())
                .and_then(|text| first_integer(&text))
        })
        .or_else(|| {
            facts
                .iter()
                .filter(|(label, _)| {
                    let lower = label.to_lowercase();
                    label.contains("階") || (lower.contains("floor") && !lower.contains("area"))
                })
                .find_map(|(_, value)| first_integer(value))
        })
        .or_else(|| {
            RE_FLOOR
                .iter()
                .find_map(|re| re.captures(page_text)?[1].parse().ok())
        })
}

fn amenity_names(document: &Html) -> Option<Vec<String>> {
    SEL_AMENITIES.iter().find_map(|(section_sel, item_sel)| {
        let section = document.select(section_sel).next()?;
        Some(
            section
                .select(item_sel)
                .map(|item| normalize_whitespace(&elem_text(item)))
                .filter(|name| !name.is_empty())
                .collect(),
        )
    })
}

fn line_id(document: &Html) -> Option<String> {
    let section = SEL_CONTACT
        .iter()
        .find_map(|s| document.select(s).next())?;
    let text = normalize_whitespace(&elem_text(section));
    RE_LINE_ID.captures(&text).map(|caps| caps[1].to_string())
}
