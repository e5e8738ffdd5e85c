//! Prompt templates, selected by the winning keyword rule.
//!
//! Unknown template ids fall back to the generic template; an empty
//! post body is replaced with a placeholder so templates never
//! interpolate an empty field.

const INDIA_SPECIFIC: &str = "\
You are a helpful assistant responding to a social-media post about India or Indian topics.
Provide a thoughtful, informative, and culturally aware response. Be respectful and avoid controversial topics.
Keep your response conversational and under 200 words.

Post Title: {title}
Post Content: {body}
Matched Keywords: {keywords}

Response:";

const HELPFUL_ADVICE: &str = "\
You are a helpful assistant responding to someone seeking advice on a social platform.
Provide practical, supportive advice while being empathetic. Keep your response conversational and under 200 words.

Post Title: {title}
Post Content: {body}
Context: {keywords}

Response:";

const TECH_DISCUSSION: &str = "\
You are a knowledgeable assistant responding to a technology-related post.
Provide informative, accurate information while being approachable. Keep your response conversational and under 200 words.

Post Title: {title}
Post Content: {body}
Tech Topics: {keywords}

Response:";

const GENERAL: &str = "\
You are a helpful assistant responding to a social-media post.
Provide a thoughtful, relevant response that adds value to the discussion. Keep your response conversational and under 200 words.

Post Title: {title}
Post Content: {body}
Keywords: {keywords}

Response:";

/// Render the prompt for a post using the rule's template id.
pub fn render_prompt(
    template_id: Option<&str>,
    title: &str,
    body: &str,
    keywords: &[String],
) -> String {
    let template = match template_id {
        Some("india_specific") => INDIA_SPECIFIC,
        Some("helpful_advice") => HELPFUL_ADVICE,
        Some("tech_discussion") => TECH_DISCUSSION,
        _ => GENERAL,
    };

    let body = if body.is_empty() {
        "No content provided"
    } else {
        body
    };

    template
        .replace("{title}", title)
        .replace("{body}", body)
        .replace("{keywords}", &keywords.join(", "))
}
