//! Declared collection schemas.
//!
//! The attribute list is the contract the provisioner verifies against the
//! live collection; any attribute missing from the store means the whole
//! collection gets rebuilt.

/// Attribute holding the natural key of every provider document.
pub const NATURAL_KEY: &str = "NPI";

/// Boolean attribute (and collection name) of the completion marker.
pub const INITIALIZED_FLAG: &str = "IsInitialized";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Text { max_len: u32 },
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDefinition {
    pub name: String,
    pub kind: AttributeKind,
    pub required: bool,
}

impl AttributeDefinition {
    pub fn text(name: impl Into<String>, max_len: u32, required: bool) -> Self {
        Self {
            name: name.into(),
            kind: AttributeKind::Text { max_len },
            required,
        }
    }

    pub fn boolean(name: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            kind: AttributeKind::Boolean,
            required,
        }
    }
}

/// Key index over one or more attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    pub key: String,
    pub attributes: Vec<String>,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    pub attributes: Vec<AttributeDefinition>,
    pub indexes: Vec<IndexDefinition>,
}

impl Schema {
    pub fn new(attributes: Vec<AttributeDefinition>) -> Self {
        Self {
            attributes,
            indexes: Vec::new(),
        }
    }

    pub fn with_index(mut self, index: IndexDefinition) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.name.as_str())
    }

    /// Declared attributes absent from `live`, in declaration order.
    pub fn missing_from<'a>(&'a self, live: &[String]) -> Vec<&'a str> {
        self.attribute_names()
            .filter(|name| !live.iter().any(|l| l == name))
            .collect()
    }
}

// name, max length; NPI is the only required attribute
const PROVIDER_TEXT_ATTRIBUTES: &[(&str, u32)] = &[
    ("Provider_Name_Prefix_Text", 128),
    ("Provider_First_Name", 128),
    ("Provider_Last_Name_Legal", 128),
    ("Endpoint_Type_Description", 128),
    ("Endpoint_Provider_Credential", 128),
    ("Mailing_Address_Telephone", 20),
    ("Mailing_Address_Fax", 20),
    ("Practice_Location_Telephone", 20),
    ("Practice_Location_Fax", 20),
    ("Authorized_Official_Telephone", 20),
    ("Taxonomy_Code_1", 50),
    ("License_Number_1", 50),
    ("License_State_Code_1", 20),
    ("Taxonomy_Code_2", 50),
    ("License_Number_2", 50),
    ("License_State_Code_2", 20),
    ("Taxonomy_Code_3", 50),
    ("License_Number_3", 50),
    ("License_State_Code_3", 20),
    ("Taxonomy_Code_4", 50),
    ("License_Number_4", 50),
    ("License_State_Code_4", 20),
    ("Taxonomy_Code_5", 50),
    ("License_Number_5", 50),
    ("License_State_Code_5", 20),
    ("Is_Sole_Proprietor", 5),
    ("Is_Organization_Subpart", 5),
    ("Last_Update_Date", 10),
    ("NPI_Deactivation_Date", 10),
    ("NPI_Reactivation_Date", 10),
    ("Provider_Gender_Code", 1),
    ("Organization_Name_Legal", 128),
    ("First_Line_Mailing_Address", 128),
    ("Second_Line_Mailing_Address", 128),
    ("Practice_Location_City", 128),
    ("Practice_Location_State", 20),
    ("Practice_Location_Postal", 20),
    ("Practice_Location_Country", 20),
    ("First_Line_Practice_Location", 128),
    ("Second_Line_Practice_Location", 128),
    ("Mailing_Address_City", 128),
    ("Mailing_Address_State", 20),
    ("Mailing_Address_Postal", 20),
    ("Mailing_Address_Country", 20),
];

/// Schema of the provider collection.
pub fn provider_schema() -> Schema {
    let mut attributes = Vec::with_capacity(PROVIDER_TEXT_ATTRIBUTES.len() + 1);
    attributes.push(AttributeDefinition::text(NATURAL_KEY, 128, true));
    attributes.extend(
        PROVIDER_TEXT_ATTRIBUTES
            .iter()
            .map(|&(name, len)| AttributeDefinition::text(name, len, false)),
    );
    Schema::new(attributes).with_index(IndexDefinition {
        key: "createdAt_desc".into(),
        attributes: vec!["$createdAt".into()],
        descending: true,
    })
}

/// Schema of the single-document completion marker collection.
pub fn flag_schema() -> Schema {
    Schema::new(vec![AttributeDefinition::boolean(INITIALIZED_FLAG, false)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_schema_is_keyed_on_npi() {
        let schema = provider_schema();
        assert_eq!(schema.attributes.len(), 45);
        assert_eq!(schema.attributes[0], AttributeDefinition::text("NPI", 128, true));
        assert_eq!(schema.attributes.iter().filter(|a| a.required).count(), 1);
    }

    #[test]
    fn missing_from_keeps_declaration_order() {
        let schema = Schema::new(vec![
            AttributeDefinition::text("a", 1, false),
            AttributeDefinition::text("b", 1, false),
            AttributeDefinition::text("c", 1, false),
        ]);
        assert_eq!(schema.missing_from(&["b".to_string()]), vec!["a", "c"]);
    }
}
