//! `looper --list-skills`: print discovered skills and exit.

use looper_config::AppConfig;
use looper_skills::{SkillDiscovery, SkillInfo};

pub fn list(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut discovery =
        SkillDiscovery::new(&config.workspace).with_skills_dir(config.skills_dir());
    print!("{}", format_listing(&discovery.list_with_info()));
    Ok(())
}

fn format_listing(skills: &[SkillInfo]) -> String {
    if skills.is_empty() {
        return "No skills found in workspace.\n".to_string();
    }
    let mut out = String::from("Loaded Skills:\n--------------\n");
    for skill in skills {
        out.push_str(&format!(
            "  {}\n    {}\n    ({})\n\n",
            skill.name, skill.description, skill.path
        ));
    }
    out
}
