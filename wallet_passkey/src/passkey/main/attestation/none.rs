use ciborium::value::Value as CborValue;

use crate::passkey::errors::PasskeyError;

/// `none` attestation carries no statement; the authenticator data checks done by the
/// caller are all there is to verify.
pub(super) fn verify_none_attestation(
    att_stmt: &[(CborValue, CborValue)],
) -> Result<(), PasskeyError> {
    if !att_stmt.is_empty() {
        return Err(PasskeyError::Format(
            "attStmt must be empty for none attestation".to_string(),
        ));
    }
    Ok(())
}
