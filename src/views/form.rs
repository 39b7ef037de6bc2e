use chrono::NaiveDateTime;
use indexmap::IndexMap;

/// Errors keyed by field name; form-wide errors go under [`NON_FIELD`].
pub type FieldErrors = IndexMap<String, Vec<String>>;

pub const NON_FIELD: &str = "__all__";

pub fn add_error(errors: &mut FieldErrors, field: &str, msg: impl Into<String>) {
    errors.entry(field.to_string()).or_default().push(msg.into());
}

/// Records the error of a validator, if any.
pub fn check(errors: &mut FieldErrors, field: &str, result: Result<(), String>) {
    if let Err(e) = result {
        add_error(errors, field, e);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    TextArea,
    Password,
    Number,
    DateTime,
    Email,
    Url,
    /// (value, label) choices; a blank choice is rendered for optional
    /// selects.
    Select(Vec<(String, String)>),
    Hidden,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    pub value: String,
    pub required: bool,
    pub help: Option<String>,
    pub errors: Vec<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, label: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind,
            value: String::new(),
            required: false,
            help: None,
            errors: Vec::new(),
        }
    }

    pub fn text(name: &str, label: &str) -> Self {
        Self::new(name, label, FieldKind::Text)
    }

    pub fn value(mut self, value: impl ToString) -> Self {
        self.value = value.to_string();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn help(mut self, help: &str) -> Self {
        self.help = Some(help.to_string());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct Fieldset {
    pub legend: Option<String>,
    /// Fields sharing a row are laid out side by side.
    pub rows: Vec<Vec<Field>>,
}

impl Fieldset {
    pub fn new(legend: Option<&str>) -> Self {
        Self {
            legend: legend.map(str::to_string),
            rows: Vec::new(),
        }
    }

    pub fn row(mut self, fields: Vec<Field>) -> Self {
        self.rows.push(fields);
        self
    }
}

/// A table of repeated sub-forms; field names are `form-<i>-<name>`.
#[derive(Debug, Clone, Default)]
pub struct Formset {
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<Field>>,
}

pub fn formset_name(i: usize, name: &str) -> String {
    format!("form-{i}-{name}")
}

#[derive(Debug, Clone, Default)]
pub struct FormContext {
    pub title: String,
    pub action: String,
    pub submit_label: String,
    pub fieldsets: Vec<Fieldset>,
    pub formset: Option<Formset>,
    pub non_field_errors: Vec<String>,
    pub cancel_url: Option<String>,
}

impl FormContext {
    pub fn new(title: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            action: action.into(),
            submit_label: "Save".to_string(),
            ..Default::default()
        }
    }

    pub fn submit_label(mut self, label: &str) -> Self {
        self.submit_label = label.to_string();
        self
    }

    pub fn fieldset(mut self, fieldset: Fieldset) -> Self {
        self.fieldsets.push(fieldset);
        self
    }

    pub fn formset(mut self, formset: Formset) -> Self {
        self.formset = Some(formset);
        self
    }

    pub fn cancel_url(mut self, url: Option<String>) -> Self {
        self.cancel_url = url;
        self
    }

    /// Attaches each error to the field it names.
    pub fn with_errors(mut self, errors: &FieldErrors) -> Self {
        for (name, messages) in errors {
            if name == NON_FIELD {
                self.non_field_errors.extend(messages.iter().cloned());
                continue;
            }
            let fields = self
                .fieldsets
                .iter_mut()
                .flat_map(|fs| fs.rows.iter_mut().flatten())
                .chain(
                    self.formset
                        .iter_mut()
                        .flat_map(|fs| fs.rows.iter_mut().flatten()),
                );
            let mut attached = false;
            for field in fields {
                if &field.name == name {
                    field.errors.extend(messages.iter().cloned());
                    attached = true;
                }
            }
            if !attached {
                self.non_field_errors.extend(messages.iter().cloned());
            }
        }
        self
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
];

pub fn parse_datetime(value: &str) -> Result<NaiveDateTime, String> {
    let value = value.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(value, f).ok())
        .ok_or_else(|| "Enter a valid date/time.".to_string())
}

/// The value of a `datetime-local` input.
pub fn format_datetime(value: &NaiveDateTime) -> String {
    value.format("%Y-%m-%dT%H:%M").to_string()
}

pub fn parse_int(value: &str, min: i32) -> Result<i32, String> {
    let n = value
        .trim()
        .parse::<i32>()
        .map_err(|_| "Enter a whole number.".to_string())?;
    if n < min {
        return Err(format!(
            "Ensure this value is greater than or equal to {min}."
        ));
    }
    Ok(n)
}

/// An optional foreign key from a select; the blank choice is `None`.
pub fn parse_optional_id(value: &str) -> Result<Option<i32>, String> {
    match value.trim() {
        "" => Ok(None),
        v => v
            .parse::<i32>()
            .map(Some)
            .map_err(|_| "Select a valid choice.".to_string()),
    }
}

/// Checks that a select value is one of its choices.
pub fn check_choice(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<i32>,
    choices: &[(String, String)],
) {
    if let Some(v) = value {
        if !choices.iter().any(|(c, _)| *c == v.to_string()) {
            add_error(
                errors,
                field,
                "Select a valid choice. That choice is not one of the \
                 available choices.",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datetime_inputs() {
        let dt = parse_datetime("2024-05-03T19:30").unwrap();
        assert_eq!(format_datetime(&dt), "2024-05-03T19:30");
        assert!(parse_datetime("2024-05-03 19:30:15").is_ok());
        assert!(parse_datetime("tomorrow").is_err());
    }

    #[test]
    fn numbers_and_ids() {
        assert_eq!(parse_int(" 4 ", 1), Ok(4));
        assert!(parse_int("0", 1).is_err());
        assert!(parse_int("four", 1).is_err());
        assert_eq!(parse_optional_id(""), Ok(None));
        assert_eq!(parse_optional_id("7"), Ok(Some(7)));
        assert!(parse_optional_id("x").is_err());
    }

    #[test]
    fn errors_attach_to_fields() {
        let mut errors = FieldErrors::new();
        add_error(&mut errors, "name", "This field is required.");
        add_error(&mut errors, NON_FIELD, "Something else.");
        add_error(&mut errors, "ghost", "No such field.");

        let form = FormContext::new("Add meet", "/meets/create/")
            .fieldset(Fieldset::new(None).row(vec![Field::text("name", "Name")]))
            .with_errors(&errors);

        assert_eq!(form.fieldsets[0].rows[0][0].errors.len(), 1);
        assert_eq!(
            form.non_field_errors,
            vec!["Something else.".to_string(), "No such field.".to_string()]
        );
    }
}
