//! services/phone_normalizer.rs
//! Normaliza teléfonos de planillas a E.164 (función pura, sin efectos).

/// Código de discado y largos nacionales válidos de un país.
#[derive(Debug, Clone, Copy)]
pub struct CountryDialing {
    pub iso: &'static str,
    pub dial_code: &'static str,
    pub national_min: usize,
    pub national_max: usize,
}

const KNOWN_COUNTRIES: &[CountryDialing] = &[
    CountryDialing { iso: "TR", dial_code: "90", national_min: 10, national_max: 10 },
    CountryDialing { iso: "US", dial_code: "1", national_min: 10, national_max: 10 },
    CountryDialing { iso: "CA", dial_code: "1", national_min: 10, national_max: 10 },
    CountryDialing { iso: "GB", dial_code: "44", national_min: 10, national_max: 10 },
    CountryDialing { iso: "DE", dial_code: "49", national_min: 10, national_max: 11 },
    CountryDialing { iso: "FR", dial_code: "33", national_min: 9, national_max: 9 },
    CountryDialing { iso: "ES", dial_code: "34", national_min: 9, national_max: 9 },
    CountryDialing { iso: "IT", dial_code: "39", national_min: 9, national_max: 10 },
    CountryDialing { iso: "NL", dial_code: "31", national_min: 9, national_max: 9 },
    CountryDialing { iso: "MX", dial_code: "52", national_min: 10, national_max: 10 },
    CountryDialing { iso: "BR", dial_code: "55", national_min: 10, national_max: 11 },
    CountryDialing { iso: "IN", dial_code: "91", national_min: 10, national_max: 10 },
    CountryDialing { iso: "AE", dial_code: "971", national_min: 9, national_max: 9 },
    CountryDialing { iso: "SA", dial_code: "966", national_min: 9, national_max: 9 },
    CountryDialing { iso: "AZ", dial_code: "994", national_min: 9, national_max: 9 },
];

/// Dígitos permitidos después del '+'.
const E164_MIN_DIGITS: usize = 8;
const E164_MAX_DIGITS: usize = 15;
/// Largo mínimo para aceptar un número sin país reconocido.
const PLAUSIBLE_MIN_DIGITS: usize = 10;

pub fn dialing_for(iso: &str) -> Option<&'static CountryDialing> {
    let iso = iso.trim();
    KNOWN_COUNTRIES
        .iter()
        .find(|c| c.iso.eq_ignore_ascii_case(iso))
}

/// Convierte un valor crudo de planilla a E.164.
///
/// Reglas, en orden:
/// 1. notación científica (`9.05058E+11`) se expande a decimal;
/// 2. se descarta todo salvo dígitos y un `+` inicial;
/// 3. con `+` se acepta tal cual (o `00` como prefijo internacional);
/// 4. prefijo de país conocido con largo nacional válido, código troncal `0`,
///    largo de móvil del país por defecto, o al menos 10 dígitos.
///
/// Devuelve `None` si el número no es utilizable.
pub fn normalize_phone(raw: &str, default_country: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let expanded = match expand_scientific(raw) {
        Expansion::Digits(digits) => digits,
        Expansion::Plain => strip_decimal_zeros(raw).to_string(),
        Expansion::TooLong => return None,
    };
    let has_plus = expanded.trim_start().starts_with('+');
    let digits: String = expanded.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    if has_plus {
        return to_e164(&digits);
    }
    if let Some(international) = digits.strip_prefix("00") {
        return to_e164(international);
    }

    let default = dialing_for(default_country);

    // Prefijo de país conocido (primero el país por defecto)
    let candidates = default
        .into_iter()
        .chain(KNOWN_COUNTRIES.iter().filter(|c| Some(c.iso) != default.map(|d| d.iso)));
    for country in candidates {
        if let Some(national) = digits.strip_prefix(country.dial_code) {
            if (country.national_min..=country.national_max).contains(&national.len())
                && !national.starts_with('0')
            {
                return to_e164(&digits);
            }
        }
    }

    if let Some(country) = default {
        // Código troncal nacional
        if let Some(national) = digits.strip_prefix('0') {
            if (country.national_min..=country.national_max).contains(&national.len()) {
                return to_e164(&format!("{}{}", country.dial_code, national));
            }
        }
        // Móvil sin código de país
        if (country.national_min..=country.national_max).contains(&digits.len()) {
            return to_e164(&format!("{}{}", country.dial_code, digits));
        }
    }

    if digits.len() >= PLAUSIBLE_MIN_DIGITS && !digits.starts_with('0') {
        return to_e164(&digits);
    }

    None
}

fn to_e164(digits: &str) -> Option<String> {
    if (E164_MIN_DIGITS..=E164_MAX_DIGITS).contains(&digits.len()) && !digits.starts_with('0') {
        Some(format!("+{}", digits))
    } else {
        None
    }
}

/// `905321234567.0` -> `905321234567` (celdas numéricas exportadas como float).
fn strip_decimal_zeros(raw: &str) -> &str {
    match raw.split_once('.') {
        Some((int_part, frac))
            if !int_part.is_empty()
                && int_part.chars().all(|c| c.is_ascii_digit() || c == '+')
                && !frac.is_empty()
                && frac.chars().all(|c| c == '0') =>
        {
            int_part
        }
        _ => raw,
    }
}

/// Resultado de expandir una celda que puede venir en notación científica.
enum Expansion {
    /// No es notación científica.
    Plain,
    Digits(String),
    /// Daría más dígitos de los que admite E.164.
    TooLong,
}

/// Expande notación científica sin pasar por `f64`, para no perder dígitos.
/// El largo se acota antes de reservar memoria.
fn expand_scientific(raw: &str) -> Expansion {
    let (mantissa, exponent) = match raw.split_once(|c| c == 'e' || c == 'E') {
        Some(parts) => parts,
        None => return Expansion::Plain,
    };

    let mantissa = mantissa.trim().trim_start_matches('+');
    let (int_part, frac_part) = mantissa
        .split_once(|c| c == '.' || c == ',')
        .unwrap_or((mantissa, ""));
    if int_part.is_empty()
        || !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return Expansion::Plain;
    }

    let exponent = exponent.trim().trim_start_matches('+');
    if exponent.is_empty() || !exponent.chars().all(|c| c.is_ascii_digit()) {
        return Expansion::Plain;
    }
    let exponent = match exponent.parse::<usize>() {
        Ok(e) if int_part.len().saturating_add(e) <= E164_MAX_DIGITS => e,
        _ => return Expansion::TooLong,
    };

    let mut digits = String::with_capacity(int_part.len() + exponent);
    digits.push_str(int_part);
    if frac_part.len() <= exponent {
        digits.push_str(frac_part);
        digits.push_str(&"0".repeat(exponent - frac_part.len()));
    } else {
        digits.push_str(&frac_part[..exponent]);
    }
    Expansion::Digits(digits)
}
