//! Two-pane consultation view: patient chart and clinical notes beside the
//! video stage.
//!
//! The chart and notes are demonstration fixtures; shells render them from
//! the serialized form.

use serde::Serialize;

/// Panel flags of the in-call view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsultationView {
    /// Video stage fills the screen; chart and notes are hidden.
    pub video_expanded: bool,
    pub chat_open: bool,
    /// "Your meeting is ready" share popup, shown when entering the call.
    pub share_popup_visible: bool,
    pub meeting_link: String,
}

impl ConsultationView {
    pub fn new(meeting_link: String) -> Self {
        Self {
            video_expanded: false,
            chat_open: false,
            share_popup_visible: true,
            meeting_link,
        }
    }

    pub fn toggle_video_expanded(&mut self) -> bool {
        self.video_expanded = !self.video_expanded;
        self.video_expanded
    }

    pub fn toggle_chat(&mut self) -> bool {
        self.chat_open = !self.chat_open;
        self.chat_open
    }

    pub fn dismiss_share_popup(&mut self) {
        self.share_popup_visible = false;
    }

    pub fn chart_visible(&self) -> bool {
        !self.video_expanded
    }

    pub fn notes_visible(&self) -> bool {
        !self.video_expanded
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChartAlert {
    pub level: AlertLevel,
    pub title: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmergencyContact {
    pub relation: String,
    pub name: String,
    pub phone: String,
}

/// Administrative and medical summary of the patient.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PatientChart {
    pub name: String,
    pub birth_date: String,
    pub age: String,
    pub height: String,
    pub weight: String,
    pub address: String,
    pub social_security_number: String,
    pub referring_doctor: String,
    /// National health identity not yet confirmed.
    pub provisional_identity: bool,
    pub alerts: Vec<ChartAlert>,
    pub history: String,
    pub emergency_contact: EmergencyContact,
}

impl PatientChart {
    pub fn demo() -> Self {
        Self {
            name: "Marcus Patient LEBERT".into(),
            birth_date: "15/05/1990".into(),
            age: "35 ans".into(),
            height: "1m83".into(),
            weight: "89 kg".into(),
            address: "22 rue de Moulins, 39200 Actung HB".into(),
            social_security_number: "1 90 05 39 999 999".into(),
            referring_doctor: "Dr. Jeanne Dupont (Généraliste)".into(),
            provisional_identity: true,
            alerts: vec![
                ChartAlert {
                    level: AlertLevel::Critical,
                    title: "Information consultative sur ce patient".into(),
                    detail: "Suivi d'infection respiratoire aiguë dans les 7 derniers jours.".into(),
                },
                ChartAlert {
                    level: AlertLevel::Warning,
                    title: "Identité du patient pas vérifiée".into(),
                    detail: "Un contrôle d'identité doit être réalisé avant de conclure la consultation."
                        .into(),
                },
            ],
            history: "Antécédents : asthme modéré, vaccination COVID à jour. Allergie connue : pénicilline."
                .into(),
            emergency_contact: EmergencyContact {
                relation: "Parent".into(),
                name: "Jeanne LE BERT".into(),
                phone: "06 12 34 56 78".into(),
            },
        }
    }

    pub fn to_json(&self) -> String {
        to_json_or_empty("patient chart", self)
    }
}

/// Clinical observation written during the consultation.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClinicalNotes {
    pub documented: bool,
    pub history_taking: Vec<String>,
    /// Examination marked "not applicable" for this visit.
    pub examination_not_applicable: bool,
    pub examination: String,
    pub conclusion: String,
}

impl ClinicalNotes {
    pub fn demo() -> Self {
        Self {
            documented: true,
            history_taking: vec![
                "Toux sèche depuis 3 jours, fébricule hier soir (37.8°C)".into(),
                "Céphalées légères, pas de dyspnée rapportée".into(),
            ],
            examination_not_applicable: false,
            examination: "Patient serein, eupnéique, saturation SpO₂ 98% AA, auscultation pulmonaire claire. \
                          Pas de signe de détresse respiratoire."
                .into(),
            conclusion: "Rhinopharyngite virale probable. Traitement symptomatique, hydratation, surveillance. \
                         Revue si fièvre > 38.5°C ou dyspnée."
                .into(),
        }
    }

    pub fn to_json(&self) -> String {
        to_json_or_empty("clinical notes", self)
    }
}

/// Serialize a panel for the shell; a failure is logged and yields `""`.
fn to_json_or_empty<T: Serialize>(what: &str, value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!("failed to serialize {what}: {e}");
            String::new()
        }
    }
}
