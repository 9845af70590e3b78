use crate::source::Record;
use crate::store::Fields;
use serde_json::Value;

/// NPPES CSV header -> provider attribute.
///
/// Two headers may feed the same attribute when CMS renamed a column between
/// releases; only one of them is ever present in a given file.
pub const NPPES_COLUMNS: &[(&str, &str)] = &[
    ("NPI", "NPI"),
    ("Entity Type Code", "Endpoint_Type_Description"),
    ("Provider Organization Name (Legal Business Name)", "Organization_Name_Legal"),
    ("Provider Last Name (Legal Name)", "Provider_Last_Name_Legal"),
    ("Provider First Name", "Provider_First_Name"),
    ("Provider Name Prefix Text", "Provider_Name_Prefix_Text"),
    ("Provider Credential Text", "Endpoint_Provider_Credential"),
    ("Provider First Line Business Mailing Address", "First_Line_Mailing_Address"),
    ("Provider Second Line Business Mailing Address", "Second_Line_Mailing_Address"),
    ("Provider Business Mailing Address City Name", "Mailing_Address_City"),
    ("Provider Business Mailing Address State Name", "Mailing_Address_State"),
    ("Provider Business Mailing Address Postal Code", "Mailing_Address_Postal"),
    (
        "Provider Business Mailing Address Country Code (If outside U.S.)",
        "Mailing_Address_Country",
    ),
    ("Provider Business Mailing Address Telephone Number", "Mailing_Address_Telephone"),
    ("Provider Business Mailing Address Fax Number", "Mailing_Address_Fax"),
    ("Provider First Line Business Practice Location Address", "First_Line_Practice_Location"),
    ("Provider Second Line Business Practice Location Address", "Second_Line_Practice_Location"),
    ("Provider Business Practice Location Address City Name", "Practice_Location_City"),
    ("Provider Business Practice Location Address State Name", "Practice_Location_State"),
    ("Provider Business Practice Location Address Postal Code", "Practice_Location_Postal"),
    (
        "Provider Business Practice Location Address Country Code (If outside U.S.)",
        "Practice_Location_Country",
    ),
    (
        "Provider Business Practice Location Address Telephone Number",
        "Practice_Location_Telephone",
    ),
    ("Provider Business Practice Location Address Fax Number", "Practice_Location_Fax"),
    ("Last Update Date", "Last_Update_Date"),
    ("NPI Deactivation Date", "NPI_Deactivation_Date"),
    ("NPI Reactivation Date", "NPI_Reactivation_Date"),
    ("Provider Gender Code", "Provider_Gender_Code"),
    ("Provider Sex Code", "Provider_Gender_Code"),
    ("Authorized Official Telephone Number", "Authorized_Official_Telephone"),
    ("Healthcare Provider Taxonomy Code_1", "Taxonomy_Code_1"),
    ("Provider License Number_1", "License_Number_1"),
    ("Provider License Number State Code_1", "License_State_Code_1"),
    ("Healthcare Provider Taxonomy Code_2", "Taxonomy_Code_2"),
    ("Provider License Number_2", "License_Number_2"),
    ("Provider License Number State Code_2", "License_State_Code_2"),
    ("Healthcare Provider Taxonomy Code_3", "Taxonomy_Code_3"),
    ("Provider License Number_3", "License_Number_3"),
    ("Provider License Number State Code_3", "License_State_Code_3"),
    ("Healthcare Provider Taxonomy Code_4", "Taxonomy_Code_4"),
    ("Provider License Number_4", "License_Number_4"),
    ("Provider License Number State Code_4", "License_State_Code_4"),
    ("Healthcare Provider Taxonomy Code_5", "Taxonomy_Code_5"),
    ("Provider License Number_5", "License_Number_5"),
    ("Provider License Number State Code_5", "License_State_Code_5"),
    ("Is Sole Proprietor", "Is_Sole_Proprietor"),
    ("Is Organization Subpart", "Is_Organization_Subpart"),
];

/// Projects source records onto store attributes through a static dictionary.
#[derive(Debug, Clone, Copy)]
pub struct FieldMapper {
    dictionary: &'static [(&'static str, &'static str)],
}

impl Default for FieldMapper {
    fn default() -> Self {
        Self::nppes()
    }
}

impl FieldMapper {
    pub const fn new(dictionary: &'static [(&'static str, &'static str)]) -> Self {
        Self { dictionary }
    }

    pub const fn nppes() -> Self {
        Self::new(NPPES_COLUMNS)
    }

    /// Source columns the dictionary reads; used to project the CSV reader.
    pub fn source_columns(&self) -> impl Iterator<Item = &'static str> {
        self.dictionary.iter().map(|&(column, _)| column)
    }

    /// Unmapped columns are dropped, mapped-but-empty ones become `null`,
    /// and columns the record does not carry are left out entirely.
    pub fn map(&self, record: &Record) -> Fields {
        let mut fields = Fields::new();
        for &(column, attribute) in self.dictionary {
            if let Some(value) = record.get(column) {
                match value {
                    Some(v) => {
                        fields.insert(attribute.to_string(), Value::from(v));
                    }
                    None => {
                        fields.entry(attribute.to_string()).or_insert(Value::Null);
                    }
                }
            }
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_renames_and_nulls() {
        let record = Record::from_pairs([
            ("NPI", "1234567893"),
            ("Provider First Name", "ADA"),
            ("Provider Name Prefix Text", ""),
            ("Not In Dictionary", "x"),
        ]);
        let fields = FieldMapper::nppes().map(&record);

        assert_eq!(fields["NPI"], Value::from("1234567893"));
        assert_eq!(fields["Provider_First_Name"], Value::from("ADA"));
        assert_eq!(fields["Provider_Name_Prefix_Text"], Value::Null);
        assert!(!fields.contains_key("Not In Dictionary"));
        assert!(!fields.contains_key("Provider_Last_Name_Legal"));
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn renamed_column_feeds_same_attribute() {
        let record = Record::from_pairs([("NPI", "1"), ("Provider Sex Code", "F")]);
        let fields = FieldMapper::nppes().map(&record);
        assert_eq!(fields["Provider_Gender_Code"], Value::from("F"));
    }
}
