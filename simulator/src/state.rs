use irrigation_shared::api::{
    BikeRegistration, Business, CustomerRegistration, MachineName, RemoteUser, RiderRegistration,
};
use irrigation_shared::{
    ActuatorState, MachineReading, PushFrame, RingBuffer, SetpointState, TelemetrySample,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

/// Samples kept per machine for `/lastsix` and the export.
pub const HISTORY_LEN: usize = 1024;

pub struct MachineRecord {
    pub name: String,
    pub latest: Option<MachineReading>,
    pub history: RingBuffer<TelemetrySample>,
    pub setpoints: SetpointState,
}

impl MachineRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            latest: None,
            history: RingBuffer::new(HISTORY_LEN),
            setpoints: SetpointState::default(),
        }
    }
}

pub struct StoredUser {
    pub user: RemoteUser,
    pub password: String,
}

/// Fleet and customer records from the onboarding forms.
#[derive(Default)]
pub struct Registry {
    pub bikes: Vec<BikeRegistration>,
    pub riders: Vec<RiderRegistration>,
    /// (customer id, record)
    pub customers: Vec<(String, CustomerRegistration)>,
}

#[derive(Clone)]
pub struct AppState {
    /// Machine id -> record. Ordered so name listings are stable.
    pub machines: Arc<Mutex<BTreeMap<String, MachineRecord>>>,

    /// Email -> account
    pub users: Arc<Mutex<HashMap<String, StoredUser>>>,

    pub registry: Arc<Mutex<Registry>>,

    /// Push frames -> every connected websocket
    pub push_tx: broadcast::Sender<PushFrame>,
}

impl AppState {
    pub fn new<I, S>(machine_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let machines = machine_ids
            .into_iter()
            .map(Into::into)
            .map(|id: String| {
                let name = format!("Machine {id}");
                (id, MachineRecord::new(name))
            })
            .collect();

        Self {
            machines: Arc::new(Mutex::new(machines)),
            users: Arc::new(Mutex::new(HashMap::new())),
            registry: Arc::new(Mutex::new(Registry::default())),
            push_tx: broadcast::channel(512).0,
        }
    }

    pub fn machines(&self) -> MutexGuard<'_, BTreeMap<String, MachineRecord>> {
        self.machines.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn users(&self) -> MutexGuard<'_, HashMap<String, StoredUser>> {
        self.users.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn machine_ids(&self) -> Vec<String> {
        self.machines().keys().cloned().collect()
    }

    pub fn machine_names(&self) -> Vec<MachineName> {
        self.machines()
            .iter()
            .map(|(id, rec)| MachineName {
                machine_id: id.clone(),
                name: rec.name.clone(),
            })
            .collect()
    }

    pub fn has_machine(&self, id: &str) -> bool {
        self.machines().contains_key(id)
    }

    /// Adds an account. Returns false if the email is taken.
    pub fn add_user(&self, user: RemoteUser, password: String) -> bool {
        let mut users = self.users();
        if users.contains_key(&user.email) {
            return false;
        }
        users.insert(user.email.clone(), StoredUser { user, password });
        true
    }

    pub fn check_login(&self, email: &str, password: &str) -> Option<RemoteUser> {
        self.users()
            .get(email)
            .filter(|u| u.password == password)
            .map(|u| u.user.clone())
    }

    /// Plate and serial numbers are unique.
    pub fn add_bike(&self, bike: BikeRegistration) -> Result<(), &'static str> {
        if !matches!(bike.generation, 1 | 2) {
            return Err("Generation must be 1 or 2");
        }
        let mut registry = self.registry();
        let taken = registry
            .bikes
            .iter()
            .any(|b| b.plate_no == bike.plate_no || b.serial_no == bike.serial_no);
        if taken {
            return Err("Bike already registered");
        }
        registry.bikes.push(bike);
        Ok(())
    }

    pub fn add_rider(&self, rider: RiderRegistration) -> Result<(), &'static str> {
        let mut registry = self.registry();
        if registry.riders.iter().any(|r| r.national_id == rider.national_id) {
            return Err("Rider already registered");
        }
        registry.riders.push(rider);
        Ok(())
    }

    /// Returns the new customer id.
    pub fn add_customer(&self, customer: CustomerRegistration) -> Result<String, &'static str> {
        let mut registry = self.registry();
        let taken = registry
            .customers
            .iter()
            .any(|(_, c)| c.business_name.eq_ignore_ascii_case(&customer.business_name));
        if taken {
            return Err("Business already registered");
        }
        let id = format!("c-{}", registry.customers.len() + 1);
        registry.customers.push((id.clone(), customer));
        Ok(id)
    }

    pub fn business_names(&self) -> Vec<Business> {
        self.registry()
            .customers
            .iter()
            .map(|(id, c)| Business {
                customer_id: id.clone(),
                business_name: c.business_name.clone(),
            })
            .collect()
    }

    pub fn record_reading(&self, reading: &MachineReading, sample: TelemetrySample) {
        let mut machines = self.machines();
        if let Some(rec) = machines.get_mut(&reading.machine) {
            rec.latest = Some(reading.clone());
            rec.history.push(sample);
        }
    }

    pub fn setpoints(&self, machine: &str) -> Option<SetpointState> {
        self.machines().get(machine).map(|r| r.setpoints)
    }

    pub fn apply_setpoints(&self, machine: &str, setpoints: SetpointState) -> bool {
        match self.machines().get_mut(machine) {
            Some(rec) => {
                rec.setpoints = setpoints;
                true
            }
            None => false,
        }
    }

    pub fn apply_actuators(&self, machine: &str, actuators: ActuatorState) -> bool {
        match self.machines().get_mut(machine) {
            Some(rec) => {
                rec.setpoints.actuators = actuators;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str) -> RemoteUser {
        RemoteUser {
            id: "u1".into(),
            fname: "Ana".into(),
            lname: String::new(),
            hub: String::new(),
            location_user: String::new(),
            email: email.into(),
            role: "admin".into(),
            permissions: vec!["read".into()],
        }
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let state = AppState::new(["m-1"]);
        assert!(state.add_user(user("a@b.c"), "pw".into()));
        assert!(!state.add_user(user("a@b.c"), "other".into()));
        assert!(state.check_login("a@b.c", "pw").is_some());
        assert!(state.check_login("a@b.c", "nope").is_none());
    }

    #[test]
    fn setpoints_only_apply_to_known_machines() {
        let state = AppState::new(["m-1", "m-2"]);
        let sp = SetpointState {
            target_temperature: 30.0,
            ..SetpointState::default()
        };
        assert!(state.apply_setpoints("m-2", sp));
        assert!(!state.apply_setpoints("m-9", sp));
        assert_eq!(state.setpoints("m-2").map(|s| s.target_temperature), Some(30.0));
        assert_eq!(state.machine_ids(), vec!["m-1".to_string(), "m-2".to_string()]);
    }

    #[test]
    fn bikes_are_unique_and_generation_checked() {
        let state = AppState::new(["m-1"]);
        let bike = |plate: &str, serial: &str, generation| BikeRegistration {
            plate_no: plate.into(),
            serial_no: serial.into(),
            generation,
        };
        assert_eq!(state.add_bike(bike("MC 101 AAA", "SN-1", 1)), Ok(()));
        assert_eq!(
            state.add_bike(bike("MC 101 AAA", "SN-2", 2)),
            Err("Bike already registered")
        );
        assert_eq!(
            state.add_bike(bike("MC 102 AAA", "SN-3", 3)),
            Err("Generation must be 1 or 2")
        );
        assert_eq!(state.registry().bikes.len(), 1);
    }
}
