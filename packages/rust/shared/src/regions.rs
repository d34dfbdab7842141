//! Canadian region vocabulary: province/territory codes, name aliases,
//! and the static city → province table used when a source omits the region.

/// The 13 province and territory codes.
pub const PROVINCE_CODES: [&str; 13] = [
    "ON", "BC", "AB", "SK", "MB", "QC", "NS", "NB", "NL", "PE", "NT", "NU", "YT",
];

/// Full names and common abbreviations, lowercase.
const PROVINCE_ALIASES: &[(&str, &str)] = &[
    ("ontario", "ON"),
    ("ont", "ON"),
    ("british columbia", "BC"),
    ("b.c.", "BC"),
    ("alberta", "AB"),
    ("alta", "AB"),
    ("saskatchewan", "SK"),
    ("sask", "SK"),
    ("manitoba", "MB"),
    ("man", "MB"),
    ("quebec", "QC"),
    ("québec", "QC"),
    ("que", "QC"),
    ("nova scotia", "NS"),
    ("new brunswick", "NB"),
    ("newfoundland and labrador", "NL"),
    ("newfoundland", "NL"),
    ("labrador", "NL"),
    ("prince edward island", "PE"),
    ("pei", "PE"),
    ("p.e.i.", "PE"),
    ("northwest territories", "NT"),
    ("nwt", "NT"),
    ("nunavut", "NU"),
    ("yukon", "YT"),
];

/// Cities whose province can be inferred from the name alone, lowercase.
const CITY_PROVINCES: &[(&str, &str)] = &[
    ("toronto", "ON"),
    ("ottawa", "ON"),
    ("mississauga", "ON"),
    ("brampton", "ON"),
    ("hamilton", "ON"),
    ("london", "ON"),
    ("markham", "ON"),
    ("vaughan", "ON"),
    ("kitchener", "ON"),
    ("waterloo", "ON"),
    ("windsor", "ON"),
    ("ayr", "ON"),
    ("calgary", "AB"),
    ("edmonton", "AB"),
    ("lethbridge", "AB"),
    ("vancouver", "BC"),
    ("victoria", "BC"),
    ("surrey", "BC"),
    ("burnaby", "BC"),
    ("richmond", "BC"),
    ("port coquitlam", "BC"),
    ("saskatoon", "SK"),
    ("regina", "SK"),
    ("winnipeg", "MB"),
    ("montreal", "QC"),
    ("montréal", "QC"),
    ("quebec city", "QC"),
    ("laval", "QC"),
    ("halifax", "NS"),
    ("fredericton", "NB"),
    ("st. john's", "NL"),
    ("charlottetown", "PE"),
    ("whitehorse", "YT"),
    ("yellowknife", "NT"),
    ("iqaluit", "NU"),
];

/// Known localities accepted without the format check.
pub const MAJOR_CITIES: &[&str] = &[
    "Toronto",
    "Vancouver",
    "Calgary",
    "Ottawa",
    "Edmonton",
    "Montreal",
    "Montréal",
    "Winnipeg",
    "Quebec",
    "Québec",
    "Quebec City",
    "Halifax",
    "Victoria",
    "Regina",
    "St. John's",
    "Fredericton",
    "Charlottetown",
    "Whitehorse",
    "Yellowknife",
    "Iqaluit",
    "Mississauga",
    "Brampton",
    "Hamilton",
    "Surrey",
    "Laval",
    "London",
    "Markham",
    "Vaughan",
    "Kitchener",
    "Windsor",
    "Richmond",
    "Burnaby",
    "Waterloo",
    "Saskatoon",
    "Ayr",
    "Port Coquitlam",
    "Lethbridge",
];

/// Whether `code` is one of the 13 province/territory codes.
pub fn is_province_code(code: &str) -> bool {
    PROVINCE_CODES.contains(&code)
}

/// Resolve a province name, abbreviation, or 2-letter code to its code.
pub fn province_code(text: &str) -> Option<&'static str> {
    let trimmed = text.trim().trim_end_matches('.');
    let upper = trimmed.to_uppercase();
    if let Some(code) = PROVINCE_CODES.iter().find(|c| **c == upper) {
        return Some(code);
    }
    let lower = text.trim().to_lowercase();
    PROVINCE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == lower || *alias == lower.trim_end_matches('.'))
        .map(|(_, code)| *code)
}

/// Infer a province from a city name.
pub fn province_for_city(city: &str) -> Option<&'static str> {
    let lower = city.trim().to_lowercase();
    CITY_PROVINCES
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, code)| *code)
}

/// Whether the city appears on the known-locality allowlist.
pub fn is_major_city(city: &str) -> bool {
    MAJOR_CITIES.iter().any(|c| c.eq_ignore_ascii_case(city.trim()))
}
