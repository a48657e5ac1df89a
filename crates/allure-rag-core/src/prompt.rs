//! Prompt construction for the generative model.

/// Header placed before the retrieved report context.
pub const CONTEXT_HEADER: &str = "Вот информация из отчёта:";

/// Default instruction for the team-wide analysis.
///
/// Asks for feedback on the current report, a trend comparison against the
/// two previously retained reports, and a fixed output format.
pub const DEFAULT_QUESTION: &str = "Проанализируй результаты текущего отчёта: \
кратко опиши общее состояние, выдели упавшие и сломанные тесты, дай обратную связь \
и рекомендации по их исправлению. Затем сравни текущий отчёт с двумя предыдущими \
сохранёнными отчётами команды и опиши тренд: что улучшилось, что ухудшилось и какие \
проблемы повторяются. Оформи ответ разделами, заголовки разделов выделяй жирным \
(**Заголовок**). Не используй символы нумерации и маркеры списков (1., 2., -, •).";

/// Join retrieved chunk texts into one context block, separated by blank lines.
pub fn build_context<S: AsRef<str>>(texts: &[S]) -> String {
    texts
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Prompt asking `question` about `context`.
pub fn question_prompt(context: &str, question: &str) -> String {
    format!(
        "{}\n{}\n\nВопрос: {}\nОтвет:",
        CONTEXT_HEADER, context, question
    )
}

/// Prompt with a caller-supplied instruction appended after the context.
pub fn override_prompt(context: &str, instruction: &str) -> String {
    format!("{}\n{}\n\n{}", CONTEXT_HEADER, context, instruction.trim())
}

/// Build the analysis prompt.
///
/// A full prompt override wins over a question override; with neither, the
/// [`DEFAULT_QUESTION`] is asked.
pub fn analysis_prompt(
    context: &str,
    question_override: Option<&str>,
    prompt_override: Option<&str>,
) -> String {
    match (prompt_override, question_override) {
        (Some(prompt), _) if !prompt.trim().is_empty() => override_prompt(context, prompt),
        (_, Some(question)) if !question.trim().is_empty() => {
            question_prompt(context, question.trim())
        }
        _ => question_prompt(context, DEFAULT_QUESTION),
    }
}
