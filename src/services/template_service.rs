use crate::error::{Error, Result};
use crate::models::template::{CategorizedTemplate, FeedbackTemplate, TemplateCategory};

static CATALOG: &[TemplateCategory] = &[
    TemplateCategory {
        key: "strong_candidate",
        name: "Strong Candidate",
        templates: &[
            FeedbackTemplate {
                id: "strong_technical",
                name: "Strong Technical Skills",
                content: "The candidate demonstrated excellent technical skills during the interview. They showed strong problem-solving abilities, clear communication, and a deep understanding of the required technologies. Their approach to the technical challenges was methodical and well-structured. I recommend moving forward with this candidate.",
            },
            FeedbackTemplate {
                id: "strong_cultural_fit",
                name: "Excellent Cultural Fit",
                content: "The candidate exhibited outstanding alignment with our company values and culture. They demonstrated strong teamwork skills, excellent communication abilities, and a positive attitude. Their experience and approach to work align well with our team dynamics. I highly recommend this candidate for the next stage.",
            },
            FeedbackTemplate {
                id: "strong_leadership",
                name: "Strong Leadership Potential",
                content: "The candidate showed impressive leadership qualities and strategic thinking. They articulated clear vision, demonstrated experience in managing teams, and showed excellent decision-making skills. Their past achievements and approach to challenges indicate strong potential for leadership roles. I strongly recommend advancing this candidate.",
            },
            FeedbackTemplate {
                id: "strong_overall",
                name: "Outstanding Overall Performance",
                content: "The candidate exceeded expectations across all evaluation criteria. They demonstrated exceptional technical competence, excellent communication skills, strong cultural alignment, and impressive problem-solving abilities. Their qualifications and performance make them an ideal fit for this position. I highly recommend proceeding to the next stage.",
            },
        ],
    },
    TemplateCategory {
        key: "needs_improvement",
        name: "Needs Improvement",
        templates: &[
            FeedbackTemplate {
                id: "technical_gaps",
                name: "Technical Skills Need Development",
                content: "The candidate showed potential but has noticeable gaps in technical skills required for this role. While they demonstrated basic understanding, they struggled with more complex problems and lacked depth in key areas. With additional training and experience, they could be a good fit. I recommend proceeding with caution or considering for a junior position.",
            },
            FeedbackTemplate {
                id: "communication_concerns",
                name: "Communication Skills Need Improvement",
                content: "The candidate has relevant technical skills but needs to improve their communication abilities. They had difficulty articulating their thoughts clearly and explaining technical concepts. This could impact their effectiveness in a collaborative environment. I recommend additional evaluation or considering for roles with less communication requirements.",
            },
            FeedbackTemplate {
                id: "experience_limited",
                name: "Limited Relevant Experience",
                content: "The candidate shows enthusiasm and willingness to learn but lacks sufficient relevant experience for this role. While they have foundational knowledge, they would require significant onboarding and mentoring. I recommend considering them for a more junior position or providing additional training opportunities.",
            },
            FeedbackTemplate {
                id: "mixed_performance",
                name: "Mixed Performance",
                content: "The candidate demonstrated strengths in some areas but showed weaknesses in others. While they have potential, there are concerns about their readiness for this specific role. I recommend further evaluation in the next stage to better assess their overall fit and capabilities.",
            },
        ],
    },
    TemplateCategory {
        key: "not_suitable",
        name: "Not Suitable",
        templates: &[
            FeedbackTemplate {
                id: "insufficient_skills",
                name: "Insufficient Technical Skills",
                content: "The candidate does not meet the minimum technical requirements for this position. They demonstrated significant gaps in essential skills and struggled with fundamental concepts. Their current skill level does not align with the role's requirements. I do not recommend moving forward with this candidate at this time.",
            },
            FeedbackTemplate {
                id: "poor_cultural_fit",
                name: "Poor Cultural Alignment",
                content: "While the candidate may have relevant technical skills, they do not align well with our company culture and values. Their approach to work, communication style, and professional demeanor raised concerns about their fit within our team. I do not recommend proceeding with this candidate.",
            },
            FeedbackTemplate {
                id: "unprepared",
                name: "Inadequate Preparation",
                content: "The candidate appeared unprepared for the interview and lacked basic knowledge about our company and the role. They were unable to answer fundamental questions and did not demonstrate genuine interest in the position. I do not recommend advancing this candidate to the next stage.",
            },
            FeedbackTemplate {
                id: "not_recommended",
                name: "Not Recommended",
                content: "After careful evaluation, I do not recommend this candidate for the position. They did not meet the required standards across multiple evaluation criteria including technical skills, communication abilities, and cultural fit. I suggest we continue our search for more suitable candidates.",
            },
        ],
    },
    TemplateCategory {
        key: "neutral",
        name: "Neutral/General",
        templates: &[
            FeedbackTemplate {
                id: "standard_evaluation",
                name: "Standard Evaluation",
                content: "The candidate completed the interview stage. They demonstrated adequate understanding of the role requirements and answered questions satisfactorily. Based on this evaluation, I recommend proceeding to the next stage for further assessment.",
            },
            FeedbackTemplate {
                id: "requires_discussion",
                name: "Requires Team Discussion",
                content: "The candidate presents an interesting profile with both strengths and areas of concern. I believe this case warrants team discussion before making a final decision. I recommend scheduling a debrief to align on the evaluation and next steps.",
            },
        ],
    },
];

/// Canned comment starters for stage feedback, grouped by outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateService;

impl TemplateService {
    pub fn new() -> Self {
        Self
    }

    pub fn all_categories(&self) -> &'static [TemplateCategory] {
        CATALOG
    }

    pub fn by_category(&self, key: &str) -> Option<&'static TemplateCategory> {
        CATALOG.iter().find(|c| c.key == key)
    }

    pub fn by_id(&self, template_id: &str) -> Option<&'static FeedbackTemplate> {
        CATALOG
            .iter()
            .flat_map(|c| c.templates.iter())
            .find(|t| t.id == template_id)
    }

    pub fn require(&self, template_id: &str) -> Result<&'static FeedbackTemplate> {
        self.by_id(template_id)
            .ok_or_else(|| Error::NotFound(format!("Template not found: {}", template_id)))
    }

    /// Every template tagged with its category, in catalog order.
    pub fn flattened(&self) -> Vec<CategorizedTemplate> {
        CATALOG
            .iter()
            .flat_map(|category| {
                category.templates.iter().map(move |template| CategorizedTemplate {
                    template: *template,
                    category_key: category.key,
                    category_name: category.name,
                })
            })
            .collect()
    }
}
