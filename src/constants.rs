/// Default settings shared by the configuration layer and the stages.

// Candidate column names
pub const DATE_FIELDS: &[&str] = &["date", "report_date", "vaccination_date", "admission_date"];
pub const LOCATION_FIELDS: &[&str] = &["region", "location", "state", "county", "hospital_location"];

// Canonical date format written by the date stage
pub const CANONICAL_DATE_FORMAT: &str = "%Y-%m-%d";

// Fill value for missing text cells
pub const UNKNOWN_TEXT: &str = "Unknown";

// Default source locations
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_CSV_FILE: &str = "cases.csv";
pub const DEFAULT_JSON_FILE: &str = "hospitals.json";
pub const DEFAULT_API_URL: &str = "https://api.example.com/covid/vaccinations";
pub const DEFAULT_HTML_URL: &str = "https://example.com/covid/stats";
pub const DEFAULT_DB_FILE: &str = "covid19.db";

// Table names
pub const CASES_TABLE: &str = "covid_cases";
pub const HOSPITALS_TABLE: &str = "hospital_resources";
pub const VACCINATIONS_TABLE: &str = "vaccinations";
pub const WEB_TABLE: &str = "web_statistics";

// Validation keyword sets
pub const RATE_KEYWORDS: &[&str] = &["rate", "percentage"];
pub const COUNT_KEYWORDS: &[&str] = &["cases", "deaths", "tests", "vaccinations"];
pub const DATE_COLUMN_HINTS: &[&str] = &["date"];
pub const LOCATION_COLUMN_HINTS: &[&str] = &["region", "location", "state"];

/// Location spellings seen across sources, mapped to one canonical name.
pub const DEFAULT_LOCATION_ALIASES: &[(&str, &str)] = &[
    ("ny", "new york"),
    ("nyc", "new york city"),
    ("n.y.", "new york"),
    ("ca", "california"),
    ("fl", "florida"),
    ("tx", "texas"),
    ("pa", "pennsylvania"),
    ("mass", "massachusetts"),
    ("ma", "massachusetts"),
    ("il", "illinois"),
    ("oh", "ohio"),
    ("ga", "georgia"),
    ("nc", "north carolina"),
    ("nj", "new jersey"),
    ("wash", "washington"),
    ("wa", "washington"),
    ("dc", "district of columbia"),
    ("d.c.", "district of columbia"),
];

// CDC open-data endpoints need their own query defaults and column names
pub const CDC_HOST_MARKER: &str = "data.cdc.gov";
pub const CDC_COLUMN_RENAMES: &[(&str, &str)] = &[
    ("case_month", "date"),
    ("state_name", "region"),
    ("current_status", "status"),
    ("sex", "gender"),
    ("age_group", "age_range"),
];

// Environment variables
pub const CONFIG_ENV_VAR: &str = "COVID_ETL_CONFIG";
pub const METRICS_PORT_ENV_VAR: &str = "COVID_ETL_METRICS_PORT";
