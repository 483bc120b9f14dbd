//! Localized reply fragments: greeting templates, signatures, subject
//! prefixes and the fixed follow-up texts used when no verified answer
//! exists. Unknown languages fall back to English.

/// Opening line placed above every reply body.
pub fn greeting_template(language: &str) -> &'static str {
    match language {
        "pl" => "Dziękujemy za zainteresowanie podróżą do Dubaju. Oto informacje dotyczące Twojego zapytania:",
        "de" => "Vielen Dank für Ihr Interesse an einer Reise nach Dubai. Hier sind die Informationen zu Ihrer Anfrage:",
        "fr" => "Merci pour votre intérêt pour un voyage à Dubaï. Voici les informations concernant votre demande:",
        "es" => "Gracias por su interés en viajar a Dubai. Aquí está la información sobre su consulta:",
        "it" => "Grazie per il vostro interesse per un viaggio a Dubai. Ecco le informazioni riguardo alla vostra richiesta:",
        "ru" => "Спасибо за ваш интерес к поездке в Дубай. Вот информация по вашему запросу:",
        _ => "Thank you for your interest in traveling to Dubai. Here is the information regarding your inquiry:",
    }
}

fn builtin_signature(language: &str) -> Option<&'static str> {
    let signature = match language {
        "pl" => "Pozdrawiam,\nDubai Travel Assistant\n\nBiuro Podróży Dubai Dreams\nTel: +48 123 456 789\nEmail: kontakt@dubaitravel.com",
        "en" => "Best regards,\nDubai Travel Assistant\n\nDubai Dreams Travel Agency\nTel: +48 123 456 789\nEmail: contact@dubaitravel.com",
        "de" => "Mit freundlichen Grüßen,\nDubai Travel Assistant\n\nReisebüro Dubai Dreams\nTel: +48 123 456 789\nEmail: kontakt@dubaitravel.com",
        "fr" => "Cordialement,\nDubai Travel Assistant\n\nAgence de Voyage Dubai Dreams\nTél: +48 123 456 789\nEmail: contact@dubaitravel.com",
        "es" => "Saludos cordiales,\nDubai Travel Assistant\n\nAgencia de Viajes Dubai Dreams\nTel: +48 123 456 789\nEmail: contacto@dubaitravel.com",
        "it" => "Cordiali saluti,\nDubai Travel Assistant\n\nAgenzia di Viaggi Dubai Dreams\nTel: +48 123 456 789\nEmail: contatto@dubaitravel.com",
        "ru" => "С уважением,\nDubai Travel Assistant\n\nТуристическое агентство Dubai Dreams\nТел: +48 123 456 789\nEmail: kontakt@dubaitravel.com",
        _ => return None,
    };
    Some(signature)
}

/// Built-in signature for `language`, else the configured one, else English.
pub fn signature(language: &str, configured: Option<&str>) -> String {
    builtin_signature(language)
        .map(str::to_string)
        .or_else(|| configured.filter(|s| !s.trim().is_empty()).map(str::to_string))
        .or_else(|| builtin_signature("en").map(str::to_string))
        .unwrap_or_default()
}

/// Reply subject: "AW:" for German, "Re:" otherwise. Never doubles a prefix.
pub fn reply_subject(language: &str, original: &str) -> String {
    let prefix = if language == "de" { "AW:" } else { "Re:" };
    let trimmed = original.trim();
    let lower = trimmed.to_lowercase();
    if lower.starts_with("re:") || lower.starts_with("aw:") {
        trimmed.to_string()
    } else {
        format!("{prefix} {trimmed}")
    }
}

/// Body used when no knowledge entry covers the question. Contains no
/// prices, names or offers; only a promise of personal follow-up.
pub fn follow_up_promise(language: &str) -> &'static str {
    match language {
        "pl" => "Nie mamy jeszcze zweryfikowanych informacji na ten temat. Nasz konsultant sprawdzi szczegóły i wkrótce skontaktuje się z Tobą osobiście z dokładną odpowiedzią.",
        "de" => "Zu diesem Thema liegen uns noch keine geprüften Informationen vor. Ein Reiseberater klärt die Details und meldet sich in Kürze persönlich mit einer genauen Antwort bei Ihnen.",
        "fr" => "Nous ne disposons pas encore d'informations vérifiées à ce sujet. Un conseiller vérifiera les détails et vous recontactera personnellement très bientôt avec une réponse précise.",
        "es" => "Todavía no disponemos de información verificada sobre este tema. Un asesor comprobará los detalles y se pondrá en contacto con usted personalmente en breve con una respuesta precisa.",
        "it" => "Non disponiamo ancora di informazioni verificate su questo argomento. Un consulente verificherà i dettagli e la ricontatterà personalmente a breve con una risposta precisa.",
        "ru" => "У нас пока нет проверенной информации по этому вопросу. Наш консультант уточнит детали и в ближайшее время свяжется с вами лично с точным ответом.",
        _ => "We do not have verified information on this topic yet. A travel consultant will check the details and get back to you personally shortly with an accurate answer.",
    }
}

/// Lead-in for a reply that quotes knowledge entries verbatim.
pub fn quoted_facts_intro(language: &str) -> &'static str {
    match language {
        "pl" => "Oto informacje, które możemy potwierdzić:",
        "de" => "Folgende Informationen können wir bestätigen:",
        "fr" => "Voici les informations que nous pouvons confirmer :",
        "es" => "Esta es la información que podemos confirmar:",
        "it" => "Ecco le informazioni che possiamo confermare:",
        "ru" => "Вот информация, которую мы можем подтвердить:",
        _ => "Here is the information we can confirm:",
    }
}

/// Closing line after quoted facts.
pub fn quoted_facts_outro(language: &str) -> &'static str {
    match language {
        "pl" => "Nasz konsultant wkrótce odpowie na pozostałe pytania.",
        "de" => "Ein Reiseberater beantwortet Ihre weiteren Fragen in Kürze.",
        "fr" => "Un conseiller répondra très bientôt à vos autres questions.",
        "es" => "Un asesor responderá en breve a sus demás preguntas.",
        "it" => "Un consulente risponderà a breve alle altre domande.",
        "ru" => "Наш консультант скоро ответит на остальные вопросы.",
        _ => "A travel consultant will answer any remaining questions shortly.",
    }
}

/// Heading for upsell suggestions.
pub fn upsell_heading(language: &str) -> &'static str {
    match language {
        "pl" => "Dodatkowe rekomendacje specjalnie dla Ciebie:",
        "de" => "Zusätzliche Empfehlungen speziell für Sie:",
        "fr" => "Recommandations supplémentaires rien que pour vous :",
        "es" => "Recomendaciones adicionales especialmente para usted:",
        "it" => "Raccomandazioni aggiuntive pensate per lei:",
        "ru" => "Дополнительные рекомендации специально для вас:",
        _ => "Additional recommendations just for you:",
    }
}
