use overmsg_protocol::{
    ALLOWED_NAME_SYMBOLS, MAX_CREDENTIAL_CHARS, MAX_NAME_CHARS, MIN_NAME_CHARS, ReasonCode,
};

/// Check an identity name against the naming rules.
///
/// Rules are applied in a fixed order so a name breaking several of them
/// always reports the same code: length, leading underscore, alphabet.
pub fn validate_name(name: &str) -> Result<(), ReasonCode> {
    let len = name.chars().count();
    if len < MIN_NAME_CHARS {
        return Err(ReasonCode::NameTooShort);
    }
    if len > MAX_NAME_CHARS {
        return Err(ReasonCode::NameTooLong);
    }
    if name.starts_with('_') {
        return Err(ReasonCode::NameLeadingUnderscore);
    }
    if !name.chars().all(|c| ALLOWED_NAME_SYMBOLS.contains(c)) {
        return Err(ReasonCode::NameDisallowedCharacters);
    }
    Ok(())
}

pub fn validate_credential(credential: &str) -> Result<(), ReasonCode> {
    let len = credential.chars().count();
    if len == 0 {
        return Err(ReasonCode::CredentialInvalid);
    }
    if len > MAX_CREDENTIAL_CHARS {
        return Err(ReasonCode::CredentialTooLong);
    }
    Ok(())
}
