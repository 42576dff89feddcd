use moot_core::state::{CaseFacts, DefendantProfile, Evidence, Side};

pub fn sample_case_facts() -> CaseFacts {
    CaseFacts {
        summary: "On the night of 3 March the defendant allegedly took a bicycle from a residential compound.".into(),
        case_number: "(2024) E0105 Criminal First Instance No. 17".into(),
        court_name: "Eastgate District People's Court".into(),
        presiding_judge: "Wang".into(),
        associate_judge: "Liu".into(),
        clerk_name: "Li".into(),
        prosecuting_office: "Eastgate District People's Procuratorate".into(),
        prosecutor_name: "Zhao".into(),
        indictment: "The defendant Chen, with the purpose of illegal possession, secretly took property of another of relatively large value.".into(),
        charge: "theft".into(),
        defendant: DefendantProfile {
            name: "Chen".into(),
            former_name: None,
            birth_date: "1990-05-12".into(),
            birthplace: "Eastgate".into(),
            ethnicity: "Han".into(),
            education: "secondary school".into(),
            occupation: "courier".into(),
            employer: "none".into(),
            residence: "12 River Road, Eastgate".into(),
            id_number: "000000199005120000".into(),
            legal_record: "none".into(),
            detention_date: "2024-03-05".into(),
            indictment_received: "2024-04-20".into(),
        },
        defense_counsel: "Sun".into(),
    }
}

pub fn sample_evidence() -> Vec<Evidence> {
    vec![
        Evidence::new(
            "P1",
            "Surveillance footage",
            "Camera at the compound gate, 23:41, shows a man wheeling a bicycle out.",
            Side::Prosecution,
        ),
        Evidence::new(
            "P2",
            "Owner statement",
            "The owner reports the bicycle missing on the morning of 4 March.",
            Side::Prosecution,
        ),
        Evidence::new(
            "P3",
            "Valuation report",
            "The bicycle is valued at 2,300.",
            Side::Prosecution,
        ),
    ]
}

pub fn defense_evidence() -> Vec<Evidence> {
    vec![Evidence::new(
        "D1",
        "Delivery log",
        "Courier app log places the defendant across town between 23:00 and 23:55.",
        Side::Defense,
    )]
}
