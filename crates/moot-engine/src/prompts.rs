//! Courtroom wording: scripted lines, generation instructions, and the
//! questions shown to the defense counsel at each pause.

use moot_core::state::{CaseFacts, Evidence};

pub const CLERK_ATTENDANCE: &str =
    "Please be seated. The parties, the public prosecutor and defense counsel are present in court.";

pub const CLERK_RULES: &str = "The court rules are as follows. Everyone in the courtroom must obey the presiding judge. \
     No recording, photography or broadcasting without permission. Mobile phones must be switched off. \
     Anyone who disrupts order will be removed. All rise for the presiding judge.";

pub const DEFENDANT_CONFIRMS: &str = "Presiding judge, the above is accurate.";

pub const DEFENDANT_NO_RECUSAL: &str =
    "I understand my rights and I do not apply for anyone to withdraw.";

pub const JUDGE_START_EVIDENCE: &str =
    "We now proceed to the examination of evidence. The public prosecutor may present the evidence.";

pub const JUDGE_CONFIRM: &str = "The prosecution has completed its evidence. \
     Does the defense have any new evidence to submit to the court?";

pub const JUDGE_START_DEBATE: &str = "The examination of evidence is concluded. We now proceed to court debate. \
     The public prosecutor will speak first.";

pub const PROSECUTION_QUESTIONS_CONCLUDED: &str =
    "Presiding judge, the public prosecutor has no further questions.";

pub const DEFENSE_QUESTIONS_CONCLUDED: &str =
    "Presiding judge, the defense has no further questions.";

pub const EVIDENCE_CONCLUDED: &str =
    "Presiding judge, the public prosecutor has finished presenting evidence.";

pub const NO_SUPPLEMENTAL_EVIDENCE: &str =
    "Presiding judge, the defense has no supplemental evidence to submit.";

pub const DEBATE_CONCLUDED: &str = "The court debate is concluded. \
     The public prosecutor will now give a closing summary.";

pub fn judge_open(facts: &CaseFacts) -> String {
    format!(
        "{} is now in session. Today this court publicly hears case {}, in which {} \
         prosecutes the defendant {} for {}. Bring the defendant {} into court.",
        facts.court_name,
        facts.case_number,
        facts.prosecuting_office,
        facts.defendant.name,
        facts.charge,
        facts.defendant.name,
    )
}

pub fn right_notify(facts: &CaseFacts) -> String {
    let mut panel = format!("presiding judge {}", facts.presiding_judge);
    if !facts.associate_judge.is_empty() {
        panel.push_str(&format!(", judge {}", facts.associate_judge));
    }
    format!(
        "This case is heard by a panel composed of {}, with {} acting as clerk. {} of {} appears for the \
         prosecution, and {} appears as defense counsel. Defendant, you have the right to apply for any of \
         these persons to withdraw, the right to present evidence, to question witnesses, to defend yourself \
         and to make a final statement. Do you understand, and do you apply for anyone to withdraw?",
        panel,
        facts.clerk_name,
        facts.prosecutor_name,
        facts.prosecuting_office,
        facts.defense_counsel,
    )
}

pub fn indictment(facts: &CaseFacts) -> String {
    format!("{} hereby reads the indictment. {}", facts.prosecuting_office, facts.indictment)
}

pub fn resolving_focus(focus: &str) -> String {
    format!(
        "The panel has heard both sides. The court will now resolve the disputed point «{}».",
        focus
    )
}

pub fn judge_check(facts: &CaseFacts) -> String {
    let d = &facts.defendant;
    let former = d.former_name.as_deref().unwrap_or("none");
    format!(
        "Verify the defendant's identity by reading out the following particulars and asking the defendant to \
         confirm them: name {}, former name {}, born {} in {}, ethnicity {}, education {}, occupation {} at {}, \
         residing at {}, identity number {}, prior record {}, detained on {}, received the indictment on {}.",
        d.name,
        former,
        d.birth_date,
        d.birthplace,
        d.ethnicity,
        d.education,
        d.occupation,
        d.employer,
        d.residence,
        d.id_number,
        d.legal_record,
        d.detention_date,
        d.indictment_received,
    )
}

pub fn pros_question(facts: &CaseFacts) -> String {
    format!(
        "Ask the defendant one focused question about the facts charged ({}). Case background: {}",
        facts.charge, facts.summary
    )
}

pub const DEFENDANT_REPLY: &str =
    "Answer the last question put to you, briefly and in your own words, consistent with your earlier answers.";

pub const PROS_SUMMARY: &str =
    "Summarize what the questioning of the defendant has established for the prosecution.";

pub fn pros_show_evidence(items: &[Evidence], joint: bool) -> String {
    let listing = describe_evidence(items);
    if joint {
        format!(
            "Present the following evidence jointly and state what it proves together:\n{}",
            listing
        )
    } else {
        format!("Present the following evidence and state what it proves:\n{}", listing)
    }
}

pub fn evidence_decision(catalog: &[Evidence], remaining_rounds: i32) -> String {
    format!(
        "Decide which evidence to present next ({} presentation rounds remain). Catalog:\n{}\n\
         Answer with JSON: {{\"current_evidence\": [ids], \"evidence_show_type\": \"single\" | \"joint\" | \"withdrawn\"}}. \
         Use \"withdrawn\" when the prosecution has nothing more to present.",
        remaining_rounds,
        describe_evidence(catalog)
    )
}

pub fn pros_cross(items: &[Evidence]) -> String {
    format!(
        "Give the prosecution's cross-examination opinion on the evidence the defense just submitted:\n{}",
        describe_evidence(items)
    )
}

pub const PROS_STATEMENT: &str =
    "Deliver the prosecution's first-round debate statement on conviction and sentencing.";

pub const DEFENDANT_SELF_STATEMENT: &str =
    "Make your own defense statement to the court, briefly.";

pub const JUDGE_SUMMARY: &str = "Summarize the points the parties dispute. \
     Answer with JSON: {\"focus_points\": [short strings], \"explanation\": string}.";

pub fn pros_focus(focus: &str) -> String {
    format!("Argue the prosecution's position on the disputed point: {}", focus)
}

pub const PROS_SUMUP: &str = "Give the prosecution's closing summary and sentencing recommendation.";

pub const DEFENDANT_FINAL_STATEMENT: &str =
    "The court grants you the final statement. Say what you want the court to consider.";

pub fn judge_verdict(facts: &CaseFacts) -> String {
    format!(
        "Pronounce the judgment on the charge of {} against {}, stating the facts found, the reasoning, and the sentence.",
        facts.charge, facts.defendant.name
    )
}

/// One line per item: `[id] name (provider): content`.
pub fn describe_evidence(items: &[Evidence]) -> String {
    items
        .iter()
        .map(|e| {
            let provider = match e.provider {
                moot_core::state::Side::Prosecution => "prosecution",
                moot_core::state::Side::Defense => "defense",
            };
            format!("[{}] {} ({}): {}", e.id, e.name, provider, e.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
