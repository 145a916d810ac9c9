// Built-in recognizer sets for spoken pediatric handoffs
use super::pattern::{PatternRecognizer, PatternRule};
use error_common::Result;

const RELATIONSHIP_WORDS: &str = "stepmother|stepfather|stepmom|stepdad|grandmother|grandfather|\
grandma|grandpa|granny|mommy|mother|mom|daddy|father|dad|nana|papa|auntie|aunt|uncle|guardian";

/// Email, phone, SSN and date formats
///
/// # Errors
///
/// `Configuration` if a pattern fails to compile.
pub fn core_recognizers() -> Result<Vec<PatternRecognizer>> {
    Ok(vec![
        PatternRecognizer::new(
            "Email Recognizer",
            "EMAIL_ADDRESS",
            vec![PatternRule::new(
                "email",
                r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
                1.0,
            )?],
        ),
        PatternRecognizer::new(
            "Phone Recognizer",
            "PHONE_NUMBER",
            vec![PatternRule::new(
                "phone_10digit",
                r"(?:\(\d{3}\)\s*|\b\d{3}[-.\s])\d{3}[-.\s]\d{4}\b",
                0.7,
            )?],
        )
        .with_context(&["call", "reach", "phone", "contact", "number", "cell", "mobile"]),
        PatternRecognizer::new(
            "SSN Recognizer",
            "US_SSN",
            vec![PatternRule::new("ssn", r"\b\d{3}-\d{2}-\d{4}\b", 0.85)?],
        ),
        PatternRecognizer::new(
            "Date Recognizer",
            "DATE_TIME",
            vec![
                PatternRule::new("numeric_date", r"\b\d{1,2}/\d{1,2}/(?:\d{4}|\d{2})\b", 0.6)?,
                PatternRule::new(
                    "month_day",
                    r"\b(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2}(?:st|nd|rd|th)?(?:,?\s+\d{4})?\b",
                    0.6,
                )?,
            ],
        ),
    ])
}

/// Record numbers, rooms and beds, short phone numbers, street addresses
///
/// # Errors
///
/// `Configuration` if a configured record-number pattern fails to compile.
pub fn medical_recognizers(mrn_patterns: &[String]) -> Result<Vec<PatternRecognizer>> {
    let mut mrn_rules = vec![
        PatternRule::new("mrn_labeled", r"\b(?:MRN|mrn)[:\s#]?\s*(\d{6,10})\b", 0.85)?.capture(1),
        PatternRule::new(
            "medical_record",
            r"(?i)\b(?:medical\s+record|chart)\s*(?:number|#|:)?\s*:?\s*(\d{6,10})\b",
            0.75,
        )?
        .capture(1),
        PatternRule::new("mrn_hash", r"#(\d{6,10})\b", 0.7)?.capture(1),
        PatternRule::new("patient_number", r"\b[Pp]atient\s*#?\s*(\d{6,10})\b", 0.75)?.capture(1),
    ];
    for (index, pattern) in mrn_patterns.iter().enumerate() {
        mrn_rules.push(PatternRule::new(format!("mrn_configured_{index}"), pattern, 0.6)?);
    }

    Ok(vec![
        PatternRecognizer::new("MRN Recognizer", "MEDICAL_RECORD_NUMBER", mrn_rules).with_context(
            &["mrn", "medical record", "chart", "record number", "patient id"],
        ),
        PatternRecognizer::new(
            "Room Number Recognizer",
            "ROOM",
            vec![
                PatternRule::new("room_standard", r"\b(?:Room|room|Rm|rm)\s+(\d{1,4}[A-Za-z]?)\b", 0.6)?
                    .capture(1),
                PatternRule::new("bed_number", r"\b(?:bed|Bed)\s+(\d{1,2}[A-Za-z]?)\b", 0.55)?
                    .capture(1),
                PatternRule::new(
                    "icu_bed",
                    r"\b(?:PICU|NICU|ICU)\s+[Bb]ed\s+(\d{1,3}[A-Za-z]?)\b",
                    0.7,
                )?
                .capture(1),
                PatternRule::new(
                    "floor_unit",
                    r"\b(\d{1,2})\s*(?:North|South|East|West|Tower|Floor)\b",
                    0.5,
                )?
                .capture(1),
            ],
        )
        .with_context(&["room", "bed", "floor", "unit", "located", "admitted to"]),
        PatternRecognizer::new(
            "Short Phone Recognizer",
            "PHONE_NUMBER",
            vec![
                PatternRule::new("phone_7digit_dash", r"\b\d{3}-\d{4}\b", 0.4)?,
                PatternRule::new("phone_7digit_dot", r"\b\d{3}\.\d{4}\b", 0.4)?,
            ],
        )
        .with_context(&["call", "reach", "phone", "contact", "number", "tel", "cell", "mobile"]),
        PatternRecognizer::new(
            "Street Address Recognizer",
            "LOCATION",
            vec![PatternRule::new(
                "street_address",
                r"\b\d{1,5}\s+[A-Z][a-z]+(?:\s+[A-Z][a-z]+)?\s+(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Drive|Dr|Lane|Ln|Way|Court|Ct|Place|Pl)\b",
                0.6,
            )?],
        )
        .with_context(&["lives", "address", "located", "home", "residence"]),
    ])
}

/// Guardian names after relationship words, baby names, schools and daycares
///
/// # Errors
///
/// `Configuration` if a pattern fails to compile.
pub fn pediatric_recognizers() -> Result<Vec<PatternRecognizer>> {
    Ok(vec![
        PatternRecognizer::new(
            "Guardian Name Recognizer",
            "GUARDIAN_NAME",
            vec![PatternRule::new(
                "relationship_name",
                &format!(r"\b(?i:{RELATIONSHIP_WORDS})\s+\(?([A-Z][a-z]+)\b"),
                0.85,
            )?
            .capture(1)],
        )
        .with_context(&["parent", "guardian", "family", "caregiver", "at bedside", "reached at", "contact"]),
        PatternRecognizer::new(
            "Baby Name Recognizer",
            "PERSON",
            vec![PatternRule::new(
                "baby_lastname",
                r"\b(?i:baby boy|baby girl|baby|infant|newborn)\s+([A-Z][a-z]+)\b",
                0.85,
            )?
            .capture(1)],
        )
        .with_context(&["baby", "infant", "newborn", "neonate", "nicu", "nursery"]),
        PatternRecognizer::new(
            "School Name Recognizer",
            "LOCATION",
            vec![
                PatternRule::new(
                    "school_name",
                    r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+)?\s+(?:Elementary|Middle|High|Primary|Secondary)(?:\s+School)?\b",
                    0.6,
                )?,
                PatternRule::new(
                    "daycare_name",
                    r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+)?\s+(?:Daycare|Day\s+Care|Preschool|Pre-school|Nursery)\b",
                    0.6,
                )?,
            ],
        )
        .with_context(&["school", "daycare", "attends", "enrolled", "student", "teacher"]),
    ])
}

/// Titled clinician names ("Dr Patel", "Kim RN")
///
/// # Errors
///
/// `Configuration` if a pattern fails to compile.
pub fn provider_recognizers() -> Result<Vec<PatternRecognizer>> {
    Ok(vec![PatternRecognizer::new(
        "Provider Name Recognizer",
        "PROVIDER_NAME",
        vec![
            PatternRule::new(
                "title_prefixed",
                r"\b(?:Dr\.?|Doctor|NP|PA|RN|Nurse)\s+([A-Z][a-z]+)\b",
                0.85,
            )?
            .capture(1),
            PatternRule::new("title_suffixed", r"\b([A-Z][a-z]+)\s+(?:MD|RN|NP|PA)\b", 0.80)?
                .capture(1),
        ],
    )
    .with_context(&[
        "doctor", "physician", "attending", "fellow", "resident", "nurse", "dr", "np", "pa", "rn",
        "primary", "consult",
    ])])
}
