pub const VAGRANTFILE: &str = include_str!("../templates/Vagrantfile");
