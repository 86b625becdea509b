use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(default = "json-registration")]
    pub registration_discriminator: String,

    #[envconfig(default = "1")]
    pub registration_priority: u32,

    /// Identifier type the medical record number of a registration is stored under.
    #[envconfig(default = "OpenMRS ID")]
    pub registration_identifier_type: String,

    #[envconfig(default = "json-demographics-update")]
    pub demographics_update_discriminator: String,

    #[envconfig(default = "6")]
    pub demographics_update_priority: u32,

    /// Identifier type used to look the target record up on demographics updates.
    #[envconfig(default = "AMRS Universal ID")]
    pub demographics_identifier_type: String,
}

impl Config {
    pub fn default_test_config() -> Self {
        Self {
            registration_discriminator: "json-registration".to_string(),
            registration_priority: 1,
            registration_identifier_type: "OpenMRS ID".to_string(),
            demographics_update_discriminator: "json-demographics-update".to_string(),
            demographics_update_priority: 6,
            demographics_identifier_type: "AMRS Universal ID".to_string(),
        }
    }
}
