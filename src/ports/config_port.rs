//! Configuration access port trait.

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    /// Every section name present in the source.
    fn sections(&self) -> Vec<String>;

    /// Keys defined in `section`, sorted. Empty when the section is absent.
    fn section_keys(&self, section: &str) -> Vec<String>;

    fn has_section(&self, section: &str) -> bool {
        let wanted = section.to_lowercase();
        self.sections().iter().any(|s| s.to_lowercase() == wanted)
    }
}
